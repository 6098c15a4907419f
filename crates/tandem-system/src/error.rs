//! Error types for systems, the registry and the plugin loader.

use tandem_core::Entity;
use thiserror::Error;

use crate::system::Phase;

/// Failure reported by a system from one of its phase methods.
///
/// The registry logs and counts these; they never abort a step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    /// The system could not complete its work for this step.
    #[error("{reason}")]
    Failed {
        /// Human-readable description.
        reason: String,
    },

    /// An entity the system works on lacks a component it requires.
    #[error("entity {entity} is missing component `{component}`")]
    MissingComponent {
        /// The incomplete entity.
        entity: Entity,
        /// Stable name of the missing component.
        component: &'static str,
    },
}

impl SystemError {
    /// Shorthand for [`SystemError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Errors from adding a system to a [`SystemRegistry`](crate::SystemRegistry).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// The system's configure phase failed; it was not registered.
    #[error("system '{name}' failed during {phase}: {source}")]
    ConfigureFailed {
        /// Name of the rejected system.
        name: String,
        /// Always [`Phase::Configure`].
        phase: Phase,
        /// What the system reported.
        source: SystemError,
    },

    /// Systems cannot be added while the owning world is running.
    #[error("cannot add system '{name}' while the simulation is running")]
    Running {
        /// Name of the rejected system.
        name: String,
    },
}

/// Errors from instantiating a plugin through a [`SystemLoader`](crate::SystemLoader).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// No factory is registered under this plugin name.
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// A plugin parameter could not be interpreted.
    #[error("plugin '{plugin}': invalid parameter '{param}': {reason}")]
    InvalidParameter {
        /// Plugin being instantiated.
        plugin: String,
        /// Offending parameter key.
        param: String,
        /// Why it was rejected.
        reason: String,
    },
}
