//! Test utilities and mock types for Tandem development.
//!
//! Provides mock components ([`JointVelocity`], [`JointVelocityCmd`],
//! [`Counter`]), the mock systems in [`fixtures`], and
//! [`register_mocks`] to make them loadable by name from world
//! descriptions.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use tandem_ecm::Component;
use tandem_system::{SystemLoader, SystemRecord};

pub use fixtures::{
    FailingSystem, FirstOrderJoint, PhaseEvent, PhaseLog, PhaseRecorder, VelocityController,
    VelocityRecorder,
};

/// Measured joint velocity, written by [`FirstOrderJoint`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointVelocity(pub f64);

impl Component for JointVelocity {
    const NAME: &'static str = "test.JointVelocity";
}

/// Requested joint velocity, written by [`VelocityController`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct JointVelocityCmd(pub f64);

impl Component for JointVelocityCmd {
    const NAME: &'static str = "test.JointVelocityCmd";
}

/// Plain integer payload for storage and query tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Counter(pub u64);

impl Component for Counter {
    const NAME: &'static str = "test.Counter";
}

/// Plain string payload for storage and query tests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl Component for Label {
    const NAME: &'static str = "test.Label";
}

/// Register every mock system under its `test.*` plugin name.
///
/// | plugin | params |
/// |---|---|
/// | `test.FirstOrderJoint` | `time_constant_ms` (default 10) |
/// | `test.VelocityController` | `target` (default 0.0) |
/// | `test.Failing` | none |
pub fn register_mocks(loader: &mut SystemLoader) -> &mut SystemLoader {
    loader
        .register("test.FirstOrderJoint", |desc| {
            let tau = desc.param::<u64>("time_constant_ms")?.unwrap_or(10);
            Ok(SystemRecord::new(FirstOrderJoint::new(tau))
                .with_update()
                .build())
        })
        .register("test.VelocityController", |desc| {
            let target = desc.param::<f64>("target")?.unwrap_or(0.0);
            Ok(SystemRecord::new(VelocityController::new(target))
                .with_configure()
                .with_pre_update()
                .build())
        })
        .register("test.Failing", |_| {
            Ok(SystemRecord::new(FailingSystem)
                .with_pre_update()
                .with_update()
                .with_post_update()
                .build())
        })
}

/// Install a test-writer `tracing` subscriber; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
