//! System capability interface for the Tandem simulation runtime.
//!
//! A system is an externally supplied unit of per-step behavior. It
//! implements [`System`] plus any subset of the phase traits
//! ([`Configure`], [`PreUpdate`], [`Update`], [`PostUpdate`]). A
//! [`SystemRecord`] holds one optional handle per phase over a single
//! shared instance; the [`SystemRegistry`] drives those handles in
//! registration order and skips phases a system does not implement.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod loader;
pub mod record;
pub mod registry;
pub mod system;

pub use error::{LoadError, RegistryError, SystemError};
pub use loader::{PluginDescription, SystemFactory, SystemLoader};
pub use record::{SystemBuilder, SystemRecord};
pub use registry::{PhaseTimings, SystemRegistry, SystemTiming};
pub use system::{Configure, Phase, PostUpdate, PreUpdate, System, Update};
