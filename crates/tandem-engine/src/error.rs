//! Error types for the runner, the worker pool and the server.

use thiserror::Error;

use tandem_network::NetworkError;
use tandem_system::RegistryError;

use crate::config::ConfigError;

/// Errors from [`SimulationRunner`](crate::SimulationRunner).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunnerError {
    /// `run` was called while the runner was not stopped.
    #[error("runner is already running")]
    AlreadyRunning,
    /// A system could not be added.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Distributed setup failed (discovery, handshake).
    #[error("network: {0}")]
    Network(#[from] NetworkError),
    /// Invalid configuration or world description.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from [`WorkerPool`](crate::WorkerPool).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// A job panicked; the worker survived.
    #[error("job panicked: {message}")]
    JobPanicked {
        /// The panic payload, if it was a string.
        message: String,
    },
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {reason}")]
    Spawn {
        /// OS error text.
        reason: String,
    },
    /// Every worker has exited.
    #[error("worker pool is shut down")]
    Closed,
}

/// Errors from [`Server`](crate::Server).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServerError {
    /// `run` was called while already running, or a stopped-only
    /// operation was attempted while running.
    #[error("server is already running")]
    AlreadyRunning,
    /// No world at this index.
    #[error("world index {index} out of range ({count} worlds)")]
    WorldIndex {
        /// Requested index.
        index: usize,
        /// Number of worlds.
        count: usize,
    },
    /// The background server thread could not be spawned.
    #[error("failed to spawn {0} thread")]
    Spawn(&'static str),
    /// Invalid configuration or world description.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A runner rejected the operation.
    #[error(transparent)]
    Runner(#[from] RunnerError),
    /// The worker pool failed.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The network manager could not be created.
    #[error("network: {0}")]
    Network(#[from] NetworkError),
}
