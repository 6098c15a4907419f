//! Tandem: a discrete-time simulation runtime with lock-step distribution.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Tandem sub-crates. For most users, adding `tandem` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use tandem::prelude::*;
//!
//! // Distance travelled, integrated from the step size.
//! #[derive(Clone, Debug, PartialEq)]
//! struct Odometer(f64);
//!
//! impl Component for Odometer {
//!     const NAME: &'static str = "example.Odometer";
//! }
//!
//! struct Drive;
//!
//! impl System for Drive {
//!     fn name(&self) -> &str { "drive" }
//! }
//!
//! impl Update for Drive {
//!     fn update(
//!         &mut self,
//!         info: &UpdateInfo,
//!         ecm: &mut EntityComponentManager,
//!     ) -> Result<(), SystemError> {
//!         ecm.each_mut::<Odometer>(|_, odo| {
//!             odo.0 += info.dt_secs();
//!             true
//!         });
//!         Ok(())
//!     }
//! }
//!
//! let world = WorldDescription::new("demo").with_entity(
//!     EntityDescription::new(EntityKind::Model, "cart").with_component(Odometer(0.0)),
//! );
//! let mut config = ServerConfig::new([world]);
//! config.runner = RunnerConfig::unthrottled();
//!
//! let mut server = Server::new(config).unwrap();
//! server.add_system(SystemRecord::new(Drive).with_update().build(), 0).unwrap();
//! server.run(true, 100, false).unwrap();
//! assert_eq!(server.iteration_count(0), Some(100));
//!
//! let cart = server.entity_by_name("cart", 0).unwrap();
//! let odo = server
//!     .with_ecm(0, |ecm| ecm.component_data::<Odometer>(cart))
//!     .unwrap()
//!     .unwrap();
//! assert!((odo.0 - 0.1).abs() < 1e-9);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tandem-core` | Entity and component ids, `UpdateInfo`, cancellation |
//! | [`ecm`] | `tandem-ecm` | Entity/component manager, queries, state deltas |
//! | [`system`] | `tandem-system` | System capability traits, registry, plugin loader |
//! | [`network`] | `tandem-network` | Primary/secondary lock-step protocol and transports |
//! | [`engine`] | `tandem-engine` | Simulation runner, worker pool and server |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Identifiers, per-step info and cancellation (`tandem-core`).
pub use tandem_core as types;

/// Entity/component manager (`tandem-ecm`).
///
/// [`ecm::EntityComponentManager`] stores the world; built-in components
/// such as [`ecm::Name`] and [`ecm::ParentEntity`] describe its structure.
pub use tandem_ecm as ecm;

/// System capability traits and registration (`tandem-system`).
pub use tandem_system as system;

/// Distributed lock-step coordination (`tandem-network`).
///
/// [`network::NetworkPrimary`] and [`network::NetworkSecondary`] over any
/// [`network::PrimaryTransport`] / [`network::SecondaryTransport`];
/// [`network::LocalBus`] connects them in-process.
pub use tandem_network as network;

/// Runner, worker pool and server (`tandem-engine`).
pub use tandem_engine as engine;

/// Common imports for typical Tandem usage.
///
/// ```rust
/// use tandem::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use tandem_core::{CancellationToken, Entity, UpdateInfo};

    // World state
    pub use tandem_ecm::{
        Component, EntityComponentManager, EntityKind, EntityQuery, Name, ParentEntity,
    };

    // Systems
    pub use tandem_system::{
        Configure, PluginDescription, PostUpdate, PreUpdate, System, SystemError, SystemLoader,
        SystemRecord, Update,
    };

    // Network
    pub use tandem_network::{NetworkConfig, NetworkManager, NetworkRole};

    // Engine
    pub use tandem_engine::{
        EntityDescription, RunnerConfig, Server, ServerConfig, SimulationRunner, WorldControl,
        WorldDescription, WorldStatistics,
    };

    // Errors
    pub use tandem_engine::{ConfigError, RunnerError, ServerError};
}
