//! Error type for entity/component operations.

use tandem_core::{ComponentTypeId, Entity};
use thiserror::Error;

/// Failures of the entity/component manager.
///
/// Absence is not an error here: lookups of missing entities or
/// components return `None`/`false`. These variants cover misuse and
/// the (practically unreachable) exhaustion of the entity id space.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcmError {
    /// The entity does not exist (never created, or already erased).
    #[error("entity {0} does not exist")]
    UnknownEntity(Entity),

    /// Every entity id has been handed out.
    #[error("entity id space exhausted")]
    IdSpaceExhausted,

    /// A value's runtime type does not match the component type it was
    /// created as. The store is left unchanged.
    #[error("component type mismatch on entity {entity}: expected {expected}, got `{found}`")]
    TypeMismatch {
        /// Entity the component was meant for.
        entity: Entity,
        /// The declared component type.
        expected: ComponentTypeId,
        /// Stable name of the value actually supplied.
        found: &'static str,
    },

    /// Two different Rust types hash to the same component type id.
    #[error("component `{name}` collides with registered `{registered}` on type id {type_id}")]
    TypeCollision {
        /// The colliding type id.
        type_id: ComponentTypeId,
        /// Rust type name of the rejected component.
        name: &'static str,
        /// Rust type name already registered under `type_id`.
        registered: &'static str,
    },
}
