//! Core types for the Tandem lock-step simulation runtime.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the identifiers and per-step records shared by every other crate in
//! the workspace: entities, component type ids and keys, [`UpdateInfo`],
//! and the [`CancellationToken`] used for cooperative shutdown.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod cancel;
pub mod id;
pub mod info;

pub use cancel::CancellationToken;
pub use id::{ComponentId, ComponentKey, ComponentTypeId, Entity};
pub use info::UpdateInfo;
