//! Error types for the network layer.

use std::time::Duration;

use thiserror::Error;

/// Failures of a transport operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The other side is gone.
    #[error("transport closed")]
    Closed,

    /// No secondary is registered under this prefix.
    #[error("no peer with prefix '{0}'")]
    UnknownPeer(String),

    /// The request was not answered in time.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Invalid network configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkConfigError {
    /// The role string is neither `primary` nor `secondary`.
    #[error("unknown network role '{0}'")]
    UnknownRole(String),

    /// The expected secondary count is not a non-negative integer.
    #[error("invalid secondary count '{0}'")]
    InvalidSecondaryCount(String),

    /// A primary must expect at least one secondary.
    #[error("primary configured with zero secondaries")]
    NoSecondaries,

    /// Run-ahead must allow at least two iterations so that step messages
    /// can be sent every half window.
    #[error("secondary_iterations must be at least 2, got {0}")]
    SecondaryIterationsTooSmall(u64),

    /// A timeout setting is zero.
    #[error("{0} must be non-zero")]
    ZeroTimeout(&'static str),
}

/// Failures of the lock-step protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Stepping was attempted before every secondary completed its handshake.
    #[error("{ready} of {expected} secondaries ready")]
    NotReady {
        /// Secondaries that completed the handshake.
        ready: usize,
        /// Secondaries required.
        expected: usize,
    },

    /// Not enough secondaries appeared before the discovery timeout.
    #[error("discovered {found} of {expected} secondaries before timeout")]
    DiscoveryTimedOut {
        /// Secondaries discovered.
        found: usize,
        /// Secondaries required.
        expected: usize,
    },

    /// One or more secondaries refused or ignored the handshake.
    #[error("handshake failed for {0:?}")]
    HandshakeFailed(Vec<String>),

    /// A secondary acknowledged an iteration with a different clock.
    #[error(
        "secondary '{prefix}' is running asynchronously: sim time {found:?} (dt {found_dt:?}), \
         expected {expected:?} (dt {expected_dt:?})"
    )]
    Desynchronized {
        /// Offending secondary.
        prefix: String,
        /// Primary's sim time for the iteration.
        expected: Duration,
        /// Secondary's sim time for the iteration.
        found: Duration,
        /// Primary's dt.
        expected_dt: Duration,
        /// Secondary's dt.
        found_dt: Duration,
    },

    /// A wait was interrupted by the cancellation token.
    #[error("cancelled")]
    Cancelled,

    /// The transport failed.
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The configuration is invalid.
    #[error("config: {0}")]
    Config(#[from] NetworkConfigError),

    /// A helper thread could not be started.
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),
}
