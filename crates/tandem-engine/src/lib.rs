//! Simulation runner, worker pool and server for Tandem worlds.
//!
//! A [`SimulationRunner`] steps one world: it owns the world's
//! [`EntityComponentManager`](tandem_ecm::EntityComponentManager) and
//! systems, and publishes its progress through a shared [`WorldControl`].
//! A [`Server`] loads every configured world and runs them, one directly
//! or several on a [`WorkerPool`].
//!
//! # Runner states
//!
//! ```text
//! Stopped ──run──▶ Running ◀──unpause── Paused
//!    ▲               │   ──pause──▶       │ request_steps(n)
//!    └──stop/done────┘                    ▼
//!                                      Stepping ──n steps──▶ Paused
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod control;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod runner;
pub mod server;
pub mod stats;
pub mod world;

pub use config::{ConfigError, NetworkEndpoint, NetworkSetup, RunnerConfig, ServerConfig};
pub use control::{RunnerState, WorldControl};
pub use error::{PoolError, RunnerError, ServerError};
pub use metrics::StepMetrics;
pub use pool::WorkerPool;
pub use runner::SimulationRunner;
pub use server::Server;
pub use stats::WorldStatistics;
pub use world::{load_world, EntityDescription, WorldDescription};
