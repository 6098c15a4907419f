//! Network role and protocol tuning.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::NetworkConfigError;

/// Environment variable selecting the role.
pub const ROLE_VAR: &str = "TANDEM_NETWORK_ROLE";

/// Environment variable with the number of secondaries a primary expects.
pub const SECONDARIES_VAR: &str = "TANDEM_NETWORK_SECONDARIES";

/// Which side of the protocol a process plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkRole {
    /// Owns the authoritative world and the barrier.
    Primary,
    /// Simulates performers assigned by the primary.
    Secondary,
}

impl FromStr for NetworkRole {
    type Err = NetworkConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            _ => Err(NetworkConfigError::UnknownRole(s.to_owned())),
        }
    }
}

impl fmt::Display for NetworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        })
    }
}

/// Distributed-run configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkConfig {
    /// This process's role.
    pub role: NetworkRole,
    /// Secondaries the primary waits for. Ignored by secondaries.
    pub num_secondaries_expected: usize,
    /// Run-ahead window granted by each step message. Default: 1000.
    pub secondary_iterations: u64,
    /// Longest the primary waits for acknowledgments of one iteration.
    /// Default: 5 s.
    pub barrier_timeout: Duration,
    /// Longest the primary waits for one secondary's handshake reply.
    /// Default: 5 s.
    pub handshake_timeout: Duration,
    /// Longest the primary waits for secondaries to appear. Default: 30 s.
    pub discovery_timeout: Duration,
}

impl NetworkConfig {
    /// Primary expecting `secondaries` peers, other settings default.
    pub fn primary(secondaries: usize) -> Self {
        Self {
            role: NetworkRole::Primary,
            num_secondaries_expected: secondaries,
            ..Self::secondary()
        }
    }

    /// Secondary with default settings.
    pub fn secondary() -> Self {
        Self {
            role: NetworkRole::Secondary,
            num_secondaries_expected: 0,
            secondary_iterations: 1000,
            barrier_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            discovery_timeout: Duration::from_secs(30),
        }
    }

    /// Read the role from `TANDEM_NETWORK_ROLE` and the secondary count
    /// from `TANDEM_NETWORK_SECONDARIES`.
    ///
    /// `Ok(None)` when no role is set, meaning a standalone run.
    pub fn from_env() -> Result<Option<Self>, NetworkConfigError> {
        let role = std::env::var(ROLE_VAR).ok();
        let secondaries = std::env::var(SECONDARIES_VAR).ok();
        Self::from_values(role.as_deref(), secondaries.as_deref())
    }

    /// Build a config from raw role and secondary-count strings.
    pub fn from_values(
        role: Option<&str>,
        secondaries: Option<&str>,
    ) -> Result<Option<Self>, NetworkConfigError> {
        let Some(role) = role.filter(|r| !r.trim().is_empty()) else {
            return Ok(None);
        };
        let config = match role.parse::<NetworkRole>()? {
            NetworkRole::Secondary => Self::secondary(),
            NetworkRole::Primary => {
                let raw = secondaries.unwrap_or("0");
                let count = raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| NetworkConfigError::InvalidSecondaryCount(raw.to_owned()))?;
                Self::primary(count)
            }
        };
        config.validate()?;
        Ok(Some(config))
    }

    /// Check every setting.
    pub fn validate(&self) -> Result<(), NetworkConfigError> {
        if self.role == NetworkRole::Primary && self.num_secondaries_expected == 0 {
            return Err(NetworkConfigError::NoSecondaries);
        }
        if self.secondary_iterations < 2 {
            return Err(NetworkConfigError::SecondaryIterationsTooSmall(
                self.secondary_iterations,
            ));
        }
        if self.barrier_timeout.is_zero() {
            return Err(NetworkConfigError::ZeroTimeout("barrier_timeout"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(NetworkConfigError::ZeroTimeout("handshake_timeout"));
        }
        if self.discovery_timeout.is_zero() {
            return Err(NetworkConfigError::ZeroTimeout("discovery_timeout"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_role_means_standalone() {
        assert_eq!(NetworkConfig::from_values(None, Some("3")), Ok(None));
        assert_eq!(NetworkConfig::from_values(Some("  "), None), Ok(None));
    }

    #[test]
    fn primary_reads_secondary_count() {
        let cfg = NetworkConfig::from_values(Some("Primary"), Some(" 2 ")).unwrap().unwrap();
        assert_eq!(cfg.role, NetworkRole::Primary);
        assert_eq!(cfg.num_secondaries_expected, 2);
        assert_eq!(cfg.secondary_iterations, 1000);
    }

    #[test]
    fn secondary_ignores_count() {
        let cfg = NetworkConfig::from_values(Some("secondary"), Some("junk")).unwrap().unwrap();
        assert_eq!(cfg.role, NetworkRole::Secondary);
    }

    #[test]
    fn rejects_bad_values() {
        assert_eq!(
            NetworkConfig::from_values(Some("leader"), None),
            Err(NetworkConfigError::UnknownRole("leader".into()))
        );
        assert_eq!(
            NetworkConfig::from_values(Some("primary"), Some("two")),
            Err(NetworkConfigError::InvalidSecondaryCount("two".into()))
        );
        assert_eq!(
            NetworkConfig::from_values(Some("primary"), None),
            Err(NetworkConfigError::NoSecondaries)
        );
    }

    #[test]
    fn validate_checks_window_and_timeouts() {
        let mut cfg = NetworkConfig::primary(1);
        assert!(cfg.validate().is_ok());
        cfg.secondary_iterations = 1;
        assert_eq!(
            cfg.validate(),
            Err(NetworkConfigError::SecondaryIterationsTooSmall(1))
        );
        cfg.secondary_iterations = 10;
        cfg.barrier_timeout = Duration::ZERO;
        assert_eq!(
            cfg.validate(),
            Err(NetworkConfigError::ZeroTimeout("barrier_timeout"))
        );
    }
}
