//! Distributed lock-step coordination for Tandem.
//!
//! One **primary** and zero or more **secondaries** simulate one logical
//! world. The primary hands each secondary a set of performers (its
//! *affinity*), publishes step messages that let secondaries run a bounded
//! number of iterations ahead, and blocks its own update phase on an
//! [`AckBarrier`] until every ready secondary has acknowledged the current
//! iteration, or a bounded wait elapses.
//!
//! Transport is abstracted behind [`PrimaryTransport`] and
//! [`SecondaryTransport`]; [`LocalBus`] implements both in-process over
//! crossbeam channels.
//!
//! # Per-secondary lifecycle
//!
//! ```text
//! Unregistered ──discover──▶ Handshaking ──enable_sim──▶ Ready
//!                                                          │ ▲
//!                                              step msg    ▼ │ bound reached
//!                                                       Stepping(n)
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod affinity;
pub mod barrier;
pub mod config;
pub mod error;
pub mod manager;
pub mod message;
pub mod primary;
pub mod secondary;
pub mod transport;

pub use affinity::assign_affinities;
pub use barrier::{AckBarrier, BarrierOutcome};
pub use config::{NetworkConfig, NetworkRole};
pub use error::{NetworkConfigError, NetworkError, TransportError};
pub use manager::NetworkManager;
pub use message::{
    prefix_of, Affinity, ControlRequest, PeerControl, PeerEvent, SecondaryStep, SimulationStep,
};
pub use primary::{NetworkPrimary, SecondaryControl, StepSync};
pub use secondary::NetworkSecondary;
pub use transport::{LocalBus, LocalPrimary, LocalSecondary, PrimaryTransport, SecondaryTransport};
