//! The [`System`] trait and the four phase capabilities.

use std::fmt;

use tandem_core::{Entity, UpdateInfo};
use tandem_ecm::EntityComponentManager;

use crate::error::SystemError;

/// Identity shared by every system.
///
/// # Contract
///
/// - Phase methods are called from the world's runner thread, one at a
///   time, in registration order.
/// - A system never sees two phases of the same step concurrently.
///
/// # Examples
///
/// ```
/// use tandem_core::UpdateInfo;
/// use tandem_ecm::EntityComponentManager;
/// use tandem_system::{System, SystemError, SystemRecord, Update};
///
/// struct Ticker(u64);
///
/// impl System for Ticker {
///     fn name(&self) -> &str { "ticker" }
/// }
///
/// impl Update for Ticker {
///     fn update(
///         &mut self,
///         _info: &UpdateInfo,
///         _ecm: &mut EntityComponentManager,
///     ) -> Result<(), SystemError> {
///         self.0 += 1;
///         Ok(())
///     }
/// }
///
/// let record = SystemRecord::new(Ticker(0)).with_update().build();
/// assert!(record.has_update());
/// assert!(!record.has_pre_update());
/// ```
pub trait System: Send + 'static {
    /// Human-readable name for logs and timings.
    fn name(&self) -> &str;
}

/// Called once when the system is added to a world.
pub trait Configure: System {
    /// Attach to `entity` (the entity the plugin was declared on).
    fn configure(
        &mut self,
        entity: Entity,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError>;
}

/// Runs first in every step; typically applies commands and sets up state.
pub trait PreUpdate: System {
    /// Execute the pre-update phase.
    fn pre_update(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError>;
}

/// Runs after the network barrier; typically integrates the simulation.
pub trait Update: System {
    /// Execute the update phase.
    fn update(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError>;
}

/// Runs last in every step with read-only access to the world.
///
/// The manager arrives as a shared borrow, and every write on
/// [`EntityComponentManager`] takes `&mut self`, so a post-update system
/// cannot change component values:
///
/// ```compile_fail
/// use tandem_core::UpdateInfo;
/// use tandem_ecm::{EntityComponentManager, Name};
/// use tandem_system::{PostUpdate, System, SystemError};
///
/// struct Renamer;
///
/// impl System for Renamer {
///     fn name(&self) -> &str { "renamer" }
/// }
///
/// impl PostUpdate for Renamer {
///     fn post_update(
///         &mut self,
///         _info: &UpdateInfo,
///         ecm: &EntityComponentManager,
///     ) -> Result<(), SystemError> {
///         for entity in ecm.entities().collect::<Vec<_>>() {
///             ecm.set_component_data(entity, Name::from("renamed"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait PostUpdate: System {
    /// Execute the post-update phase.
    fn post_update(
        &mut self,
        info: &UpdateInfo,
        ecm: &EntityComponentManager,
    ) -> Result<(), SystemError>;
}

/// One of the four system phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// [`Configure::configure`].
    Configure,
    /// [`PreUpdate::pre_update`].
    PreUpdate,
    /// [`Update::update`].
    Update,
    /// [`PostUpdate::post_update`].
    PostUpdate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configure => "configure",
            Self::PreUpdate => "pre-update",
            Self::Update => "update",
            Self::PostUpdate => "post-update",
        })
    }
}
