//! Entity/component manager for the Tandem simulation runtime.
//!
//! World state lives here as entities with typed data components. Each
//! component type gets its own dense, independently locked storage,
//! reached only through the [`ComponentStorage`] capability trait; the
//! [`EntityComponentManager`] binds components to entities and answers
//! queries over them, including "newly matching" and "pending removal"
//! views that systems use to react to structural changes.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod component;
pub mod components;
pub mod error;
pub mod manager;
pub mod query;
pub mod state;
pub mod storage;

pub use component::{Component, ComponentValue};
pub use components::{EntityKind, Name, ParentEntity, PerformerAffinity, PerformerLevels};
pub use error::EcmError;
pub use manager::{ComponentRef, EntityComponentManager};
pub use query::{Column, ComponentMap, ComponentQuery, EntityQuery};
pub use state::{StateDelta, StateEntry};
pub use storage::ComponentStorage;

pub use tandem_core::{ComponentId, ComponentKey, ComponentTypeId, Entity};
