//! Runner and server configuration, validation, and error types.
//!
//! [`ServerConfig`] is the input for [`Server::new`](crate::Server::new).
//! [`validate()`](ServerConfig::validate) checks structural invariants at
//! startup; world descriptions are checked further while they load.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use tandem_network::{NetworkConfig, NetworkConfigError, NetworkRole, PrimaryTransport, SecondaryTransport};
use tandem_system::SystemLoader;

use crate::world::WorldDescription;

// ── RunnerConfig ───────────────────────────────────────────────────

/// Per-world stepping parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Simulation time advanced per unpaused step. Default: 1 ms.
    pub step_size: Duration,
    /// Minimum wall-clock time between step starts. Zero disables
    /// throttling. Default: 1 ms (real time at the default step size).
    pub update_period: Duration,
    /// Steps averaged for the real-time factor. Default: 20.
    pub rtf_window: usize,
    /// Statistics buffered for subscribers before the oldest is dropped.
    /// Default: 64.
    pub stats_channel_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            step_size: Duration::from_millis(1),
            update_period: Duration::from_millis(1),
            rtf_window: 20,
            stats_channel_capacity: 64,
        }
    }
}

impl RunnerConfig {
    /// Unthrottled configuration for tests and batch runs.
    pub fn unthrottled() -> Self {
        Self {
            update_period: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Check the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_size.is_zero() {
            return Err(ConfigError::ZeroStepSize { world: None });
        }
        if self.rtf_window == 0 {
            return Err(ConfigError::ZeroRtfWindow);
        }
        if self.stats_channel_capacity == 0 {
            return Err(ConfigError::ZeroStatsCapacity);
        }
        Ok(())
    }
}

// ── NetworkSetup ───────────────────────────────────────────────────

/// Transport endpoint a distributed world talks through.
pub enum NetworkEndpoint {
    /// Endpoint of the primary.
    Primary(Box<dyn PrimaryTransport>),
    /// Endpoint of a secondary.
    Secondary(Box<dyn SecondaryTransport>),
}

impl NetworkEndpoint {
    /// The role this endpoint can serve.
    pub fn role(&self) -> NetworkRole {
        match self {
            Self::Primary(_) => NetworkRole::Primary,
            Self::Secondary(_) => NetworkRole::Secondary,
        }
    }
}

impl fmt::Debug for NetworkEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary(_) => f.write_str("NetworkEndpoint::Primary"),
            Self::Secondary(t) => write!(f, "NetworkEndpoint::Secondary({})", t.id()),
        }
    }
}

/// Distributed-run settings: the role configuration plus its endpoint.
#[derive(Debug)]
pub struct NetworkSetup {
    /// Role, peer count and timeouts.
    pub config: NetworkConfig,
    /// Transport endpoint matching `config.role`.
    pub endpoint: NetworkEndpoint,
}

impl NetworkSetup {
    /// Check the configuration and that the endpoint matches the role.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        let endpoint = self.endpoint.role();
        if endpoint != self.config.role {
            return Err(ConfigError::EndpointMismatch {
                role: self.config.role,
                endpoint,
            });
        }
        Ok(())
    }
}

// ── ServerConfig ───────────────────────────────────────────────────

/// Everything [`Server::new`](crate::Server::new) needs.
#[derive(Debug, Default)]
pub struct ServerConfig {
    /// One entry per world. Names must be unique and non-empty.
    pub worlds: Vec<WorldDescription>,
    /// Stepping parameters shared by every world; a world's own
    /// `step_size` overrides the one here.
    pub runner: RunnerConfig,
    /// Distributed mode. Only valid with exactly one world.
    pub network: Option<NetworkSetup>,
    /// Worker threads stepping worlds in parallel. `None` = auto-detect
    /// (`available_parallelism`, clamped to `[2, 16]`). Each world holds a
    /// worker for its whole run, so the server never starts fewer workers
    /// than worlds.
    pub worker_count: Option<usize>,
    /// Factories for the plugins named in world descriptions.
    pub loader: SystemLoader,
}

impl ServerConfig {
    /// A configuration running `worlds` standalone with default settings.
    pub fn new(worlds: impl IntoIterator<Item = WorldDescription>) -> Self {
        Self {
            worlds: worlds.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                cpus.clamp(2, 16)
            }
        }
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.runner.validate()?;
        if self.worlds.is_empty() {
            return Err(ConfigError::NoWorlds);
        }
        if self.worker_count == Some(0) {
            return Err(ConfigError::ZeroWorkerCount);
        }
        let mut seen = std::collections::HashSet::new();
        for world in &self.worlds {
            if world.name.trim().is_empty() {
                return Err(ConfigError::EmptyWorldName);
            }
            if !seen.insert(world.name.as_str()) {
                return Err(ConfigError::DuplicateWorldName(world.name.clone()));
            }
            if world.step_size.is_some_and(|s| s.is_zero()) {
                return Err(ConfigError::ZeroStepSize {
                    world: Some(world.name.clone()),
                });
            }
        }
        if let Some(network) = &self.network {
            if self.worlds.len() > 1 {
                return Err(ConfigError::NetworkWithMultipleWorlds(self.worlds.len()));
            }
            network.validate()?;
        }
        Ok(())
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating configuration or loading worlds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A step size of zero would never advance simulation time.
    #[error("step size must be positive (world override: {world:?})")]
    ZeroStepSize {
        /// World whose override is zero, `None` for the shared setting.
        world: Option<String>,
    },
    /// The real-time-factor window is empty.
    #[error("rtf_window must be at least 1")]
    ZeroRtfWindow,
    /// The statistics feed has no capacity.
    #[error("stats_channel_capacity must be at least 1")]
    ZeroStatsCapacity,
    /// An explicit worker count of zero.
    #[error("worker_count must be at least 1")]
    ZeroWorkerCount,
    /// Nothing to simulate.
    #[error("no worlds configured")]
    NoWorlds,
    /// Distributed mode drives exactly one world per process.
    #[error("distributed simulation supports one world per process, {0} configured")]
    NetworkWithMultipleWorlds(usize),
    /// The network role and the transport endpoint disagree.
    #[error("network role {role} does not match the {endpoint} endpoint")]
    EndpointMismatch {
        /// Configured role.
        role: NetworkRole,
        /// Role the endpoint serves.
        endpoint: NetworkRole,
    },
    /// Two worlds share a name.
    #[error("duplicate world name '{0}'")]
    DuplicateWorldName(String),
    /// A world has an empty name.
    #[error("world name must not be empty")]
    EmptyWorldName,
    /// Two children of one entity share a name.
    #[error("duplicate entity name '{name}' under '{parent}'")]
    DuplicateSiblingName {
        /// Scoped name of the parent.
        parent: String,
        /// The repeated child name.
        name: String,
    },
    /// An entity or component could not be created.
    #[error("world '{world}' failed to load: {reason}")]
    WorldLoad {
        /// The world being loaded.
        world: String,
        /// What went wrong.
        reason: String,
    },
    /// Invalid network configuration, including environment parse failures.
    #[error("network: {0}")]
    Network(#[from] NetworkConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_network::LocalBus;

    fn world(name: &str) -> WorldDescription {
        WorldDescription::new(name)
    }

    #[test]
    fn defaults_validate() {
        RunnerConfig::default().validate().unwrap();
        ServerConfig::new([world("default")]).validate().unwrap();
    }

    #[test]
    fn zero_values_are_rejected() {
        let cfg = RunnerConfig {
            step_size: Duration::ZERO,
            ..RunnerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroStepSize { world: None }));

        let cfg = RunnerConfig {
            rtf_window: 0,
            ..RunnerConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRtfWindow));

        let mut server = ServerConfig::new([world("w")]);
        server.worker_count = Some(0);
        assert_eq!(server.validate(), Err(ConfigError::ZeroWorkerCount));

        let server = ServerConfig::new([world("w").with_step_size(Duration::ZERO)]);
        assert_eq!(
            server.validate(),
            Err(ConfigError::ZeroStepSize {
                world: Some("w".into())
            })
        );
    }

    #[test]
    fn world_names_must_be_unique_and_present() {
        assert_eq!(ServerConfig::new([]).validate(), Err(ConfigError::NoWorlds));
        assert_eq!(
            ServerConfig::new([world(" ")]).validate(),
            Err(ConfigError::EmptyWorldName)
        );
        assert_eq!(
            ServerConfig::new([world("a"), world("a")]).validate(),
            Err(ConfigError::DuplicateWorldName("a".into()))
        );
    }

    #[test]
    fn network_needs_single_world_and_matching_endpoint() {
        let bus = LocalBus::new();
        let mut server = ServerConfig::new([world("a"), world("b")]);
        server.network = Some(NetworkSetup {
            config: NetworkConfig::primary(1),
            endpoint: NetworkEndpoint::Primary(Box::new(bus.primary())),
        });
        assert_eq!(server.validate(), Err(ConfigError::NetworkWithMultipleWorlds(2)));

        let mut server = ServerConfig::new([world("a")]);
        server.network = Some(NetworkSetup {
            config: NetworkConfig::secondary(),
            endpoint: NetworkEndpoint::Primary(Box::new(bus.primary())),
        });
        assert_eq!(
            server.validate(),
            Err(ConfigError::EndpointMismatch {
                role: NetworkRole::Secondary,
                endpoint: NetworkRole::Primary,
            })
        );

        let mut server = ServerConfig::new([world("a")]);
        server.network = Some(NetworkSetup {
            config: NetworkConfig::primary(0),
            endpoint: NetworkEndpoint::Primary(Box::new(bus.primary())),
        });
        assert!(matches!(server.validate(), Err(ConfigError::Network(_))));
    }

    #[test]
    fn worker_count_resolution() {
        let mut cfg = ServerConfig::default();
        cfg.worker_count = Some(200);
        assert_eq!(cfg.resolved_worker_count(), 64);
        cfg.worker_count = Some(3);
        assert_eq!(cfg.resolved_worker_count(), 3);
        cfg.worker_count = None;
        let auto = cfg.resolved_worker_count();
        assert!((2..=16).contains(&auto));
    }
}
