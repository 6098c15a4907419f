//! Role-polymorphic network manager.

use crate::config::NetworkRole;
use crate::primary::NetworkPrimary;
use crate::secondary::NetworkSecondary;

/// The network manager a runner owns: exactly one role per process.
#[derive(Debug)]
pub enum NetworkManager {
    /// Coordinates secondaries.
    Primary(NetworkPrimary),
    /// Executes steps on behalf of a primary.
    Secondary(NetworkSecondary),
}

impl NetworkManager {
    /// The role this manager plays.
    pub fn role(&self) -> NetworkRole {
        match self {
            Self::Primary(_) => NetworkRole::Primary,
            Self::Secondary(_) => NetworkRole::Secondary,
        }
    }

    /// Namespace prefix: empty for the primary.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Primary(_) => "",
            Self::Secondary(s) => s.namespace(),
        }
    }

    /// Primary: all expected secondaries discovered. Secondary: a primary
    /// is attached.
    pub fn ready(&self) -> bool {
        match self {
            Self::Primary(p) => p.ready(),
            Self::Secondary(s) => s.ready(),
        }
    }

    /// Whether this is the primary.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Primary(_))
    }

    /// Whether this is a secondary.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::Secondary(_))
    }

    /// The primary, if this is one.
    pub fn as_primary_mut(&mut self) -> Option<&mut NetworkPrimary> {
        match self {
            Self::Primary(p) => Some(p),
            Self::Secondary(_) => None,
        }
    }

    /// The secondary, if this is one.
    pub fn as_secondary_mut(&mut self) -> Option<&mut NetworkSecondary> {
        match self {
            Self::Secondary(s) => Some(s),
            Self::Primary(_) => None,
        }
    }
}

impl From<NetworkPrimary> for NetworkManager {
    fn from(p: NetworkPrimary) -> Self {
        Self::Primary(p)
    }
}

impl From<NetworkSecondary> for NetworkManager {
    fn from(s: NetworkSecondary) -> Self {
        Self::Secondary(s)
    }
}
