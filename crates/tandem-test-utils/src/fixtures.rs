//! Reusable mock systems.
//!
//! - [`FirstOrderJoint`]: drives [`JointVelocity`] toward [`JointVelocityCmd`]
//!   with a first-order lag (update).
//! - [`VelocityController`]: writes a settable command (configure, pre-update).
//! - [`VelocityRecorder`]: samples the measured velocity (post-update).
//! - [`PhaseRecorder`]: logs every phase call it receives.
//! - [`FailingSystem`]: fails every phase.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tandem_core::{Entity, UpdateInfo};
use tandem_ecm::{Component, EntityComponentManager};
use tandem_system::{
    Configure, Phase, PostUpdate, PreUpdate, System, SystemError, SystemRecord, Update,
};

use crate::{JointVelocity, JointVelocityCmd};

/// First-order velocity response: `v += (cmd - v) * min(1, dt / tau)`.
///
/// Zero `dt` (a paused step) leaves every velocity untouched.
pub struct FirstOrderJoint {
    time_constant: Duration,
}

impl FirstOrderJoint {
    pub fn new(time_constant_ms: u64) -> Self {
        Self {
            time_constant: Duration::from_millis(time_constant_ms.max(1)),
        }
    }
}

impl System for FirstOrderJoint {
    fn name(&self) -> &str {
        "first_order_joint"
    }
}

impl Update for FirstOrderJoint {
    fn update(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        let alpha = (info.dt.as_secs_f64() / self.time_constant.as_secs_f64()).min(1.0);
        if alpha == 0.0 {
            return Ok(());
        }
        let mut next = Vec::new();
        ecm.each::<(JointVelocityCmd, JointVelocity)>(|entity, (cmd, vel)| {
            next.push((entity, vel.0 + (cmd.0 - vel.0) * alpha));
            true
        });
        for (entity, v) in next {
            ecm.set_component_data(entity, JointVelocity(v));
        }
        Ok(())
    }
}

/// Writes [`JointVelocityCmd`] on its configured entity every pre-update.
///
/// The target can be changed from outside through
/// [`target_handle`](Self::target_handle).
pub struct VelocityController {
    target: Arc<Mutex<f64>>,
    entity: Option<Entity>,
}

impl VelocityController {
    pub fn new(target: f64) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
            entity: None,
        }
    }

    pub fn target_handle(&self) -> Arc<Mutex<f64>> {
        Arc::clone(&self.target)
    }
}

impl System for VelocityController {
    fn name(&self) -> &str {
        "velocity_controller"
    }
}

impl Configure for VelocityController {
    fn configure(
        &mut self,
        entity: Entity,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        if !ecm.entity_has_component_type(entity, JointVelocity::TYPE_ID) {
            return Err(SystemError::MissingComponent {
                entity,
                component: JointVelocity::NAME,
            });
        }
        ecm.create_component(entity, JointVelocityCmd(0.0))
            .map_err(|e| SystemError::failed(e.to_string()))?;
        self.entity = Some(entity);
        Ok(())
    }
}

impl PreUpdate for VelocityController {
    fn pre_update(
        &mut self,
        _info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        let Some(entity) = self.entity else {
            return Err(SystemError::failed("controller was never configured"));
        };
        let target = *self.target.lock();
        if ecm.component_data::<JointVelocityCmd>(entity) != Some(JointVelocityCmd(target)) {
            ecm.set_component_data(entity, JointVelocityCmd(target));
        }
        Ok(())
    }
}

/// Samples every [`JointVelocity`] in post-update.
#[derive(Default)]
pub struct VelocityRecorder {
    samples: Arc<Mutex<Vec<(u64, f64)>>>,
}

impl VelocityRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(iteration, velocity)` pairs in call order.
    pub fn samples(&self) -> Arc<Mutex<Vec<(u64, f64)>>> {
        Arc::clone(&self.samples)
    }
}

impl System for VelocityRecorder {
    fn name(&self) -> &str {
        "velocity_recorder"
    }
}

impl PostUpdate for VelocityRecorder {
    fn post_update(
        &mut self,
        info: &UpdateInfo,
        ecm: &EntityComponentManager,
    ) -> Result<(), SystemError> {
        let mut samples = self.samples.lock();
        ecm.each::<(JointVelocity,)>(|_, (vel,)| {
            samples.push((info.iterations, vel.0));
            true
        });
        Ok(())
    }
}

/// One phase call seen by a [`PhaseRecorder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhaseEvent {
    pub system: String,
    pub phase: Phase,
    pub iteration: u64,
    pub paused: bool,
    pub dt: Duration,
}

/// Shared, append-only log of [`PhaseEvent`]s.
#[derive(Clone, Default)]
pub struct PhaseLog(Arc<Mutex<Vec<PhaseEvent>>>);

impl PhaseLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: PhaseEvent) {
        self.0.lock().push(event);
    }

    pub fn events(&self) -> Vec<PhaseEvent> {
        self.0.lock().clone()
    }

    pub fn count(&self, phase: Phase) -> usize {
        self.0.lock().iter().filter(|e| e.phase == phase).count()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Records every phase call into a [`PhaseLog`].
pub struct PhaseRecorder {
    name: String,
    log: PhaseLog,
}

impl PhaseRecorder {
    pub fn new(name: impl Into<String>, log: PhaseLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }

    /// A record with all four phases enabled.
    pub fn record(name: impl Into<String>, log: PhaseLog) -> SystemRecord {
        SystemRecord::new(Self::new(name, log))
            .with_configure()
            .with_pre_update()
            .with_update()
            .with_post_update()
            .build()
    }

    fn log(&self, phase: Phase, info: &UpdateInfo) {
        self.log.push(PhaseEvent {
            system: self.name.clone(),
            phase,
            iteration: info.iterations,
            paused: info.paused,
            dt: info.dt,
        });
    }
}

impl System for PhaseRecorder {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Configure for PhaseRecorder {
    fn configure(
        &mut self,
        _entity: Entity,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        self.log(Phase::Configure, &UpdateInfo::default());
        Ok(())
    }
}

impl PreUpdate for PhaseRecorder {
    fn pre_update(
        &mut self,
        info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        self.log(Phase::PreUpdate, info);
        Ok(())
    }
}

impl Update for PhaseRecorder {
    fn update(
        &mut self,
        info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        self.log(Phase::Update, info);
        Ok(())
    }
}

impl PostUpdate for PhaseRecorder {
    fn post_update(
        &mut self,
        info: &UpdateInfo,
        _ecm: &EntityComponentManager,
    ) -> Result<(), SystemError> {
        self.log(Phase::PostUpdate, info);
        Ok(())
    }
}

/// Fails every phase it is registered for.
pub struct FailingSystem;

impl System for FailingSystem {
    fn name(&self) -> &str {
        "failing"
    }
}

impl PreUpdate for FailingSystem {
    fn pre_update(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        Err(SystemError::failed("pre-update always fails"))
    }
}

impl Update for FailingSystem {
    fn update(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &mut EntityComponentManager,
    ) -> Result<(), SystemError> {
        Err(SystemError::failed("update always fails"))
    }
}

impl PostUpdate for FailingSystem {
    fn post_update(
        &mut self,
        _info: &UpdateInfo,
        _ecm: &EntityComponentManager,
    ) -> Result<(), SystemError> {
        Err(SystemError::failed("post-update always fails"))
    }
}
