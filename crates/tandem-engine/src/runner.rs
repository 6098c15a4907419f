//! [`SimulationRunner`]: the per-world step loop.
//!
//! One step runs, strictly in order: control requests, pre-update, the
//! network barrier (primary only), update, post-update, then maintenance
//! (removal compaction, view advance, change-flag reset) and statistics.
//! A distributed secondary hands its loop to [`NetworkSecondary::run`],
//! which calls back into the same phase sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use tandem_core::{CancellationToken, Entity, UpdateInfo};
use tandem_ecm::{EntityComponentManager, Name};
use tandem_network::{NetworkError, NetworkManager, NetworkPrimary, NetworkRole, StepSync};
use tandem_system::{RegistryError, SystemLoader, SystemRecord, SystemRegistry};

use crate::config::RunnerConfig;
use crate::control::{RemovalTarget, RunnerState, WorldControl};
use crate::error::RunnerError;
use crate::metrics::{micros, StepMetrics};
use crate::stats::{RtfWindow, WorldStatistics};
use crate::world::{load_world, WorldDescription};

/// Drives the systems of one world through simulation steps.
pub struct SimulationRunner {
    ecm: EntityComponentManager,
    network: Option<NetworkManager>,
    network_ready: bool,
    core: RunnerCore,
}

/// Everything a step needs apart from the manager and the network, so the
/// secondary's callback can borrow both halves at once.
struct RunnerCore {
    config: RunnerConfig,
    systems: SystemRegistry,
    control: Arc<WorldControl>,
    cancel: CancellationToken,
    world: Option<Entity>,
    info: UpdateInfo,
    rtf: RtfWindow,
    real_time_before: Duration,
    run_started: Option<Instant>,
    last_step_start: Option<Instant>,
    barrier_timeouts: u64,
}

impl SimulationRunner {
    /// An empty world called `name`.
    pub fn new(name: impl Into<String>, config: RunnerConfig, cancel: CancellationToken) -> Self {
        let control = Arc::new(WorldControl::new(
            name,
            config.update_period,
            config.stats_channel_capacity,
        ));
        let mut runner = Self {
            ecm: EntityComponentManager::new(),
            network: None,
            network_ready: false,
            core: RunnerCore {
                rtf: RtfWindow::new(config.rtf_window),
                config,
                systems: SystemRegistry::new(),
                control,
                cancel,
                world: None,
                info: UpdateInfo::default(),
                real_time_before: Duration::ZERO,
                run_started: None,
                last_step_start: None,
                barrier_timeouts: 0,
            },
        };
        runner.sync_control();
        runner
    }

    /// Load `desc` into a new runner.
    ///
    /// A world-level `step_size` overrides the one in `config`.
    pub fn from_description(
        desc: &WorldDescription,
        mut config: RunnerConfig,
        loader: &SystemLoader,
        cancel: CancellationToken,
    ) -> Result<Self, RunnerError> {
        if let Some(step_size) = desc.step_size {
            config.step_size = step_size;
        }
        config.validate()?;
        let mut runner = Self::new(desc.name.clone(), config, cancel);
        let world = load_world(desc, &mut runner.ecm, loader, &mut runner.core.systems)?;
        runner.core.world = Some(world);
        runner.sync_control();
        Ok(runner)
    }

    /// Attach a network manager. Replaces any previous one.
    pub fn set_network(&mut self, network: NetworkManager) {
        tracing::debug!(
            world = self.core.control.name(),
            role = %network.role(),
            "network manager attached"
        );
        self.network = Some(network);
        self.network_ready = false;
    }

    /// Builder form of [`set_network`](Self::set_network).
    pub fn with_network(mut self, network: NetworkManager) -> Self {
        self.set_network(network);
        self
    }

    /// The attached network manager.
    pub fn network(&self) -> Option<&NetworkManager> {
        self.network.as_ref()
    }

    /// Mutable access to the attached network manager.
    pub fn network_mut(&mut self) -> Option<&mut NetworkManager> {
        self.network.as_mut()
    }

    /// World name.
    pub fn name(&self) -> &str {
        self.core.control.name()
    }

    /// Shared control handle.
    pub fn control(&self) -> Arc<WorldControl> {
        Arc::clone(&self.core.control)
    }

    /// The cancellation token this runner observes.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.core.cancel
    }

    /// The world entity, if the runner was loaded from a description.
    pub fn world_entity(&self) -> Option<Entity> {
        self.core.world
    }

    /// Read-only access to the world state.
    pub fn ecm(&self) -> &EntityComponentManager {
        &self.ecm
    }

    /// Run `f` against the world state, then republish counts and names.
    pub fn with_ecm<R>(&mut self, f: impl FnOnce(&mut EntityComponentManager) -> R) -> R {
        let out = f(&mut self.ecm);
        self.sync_control();
        out
    }

    /// Registered systems.
    pub fn systems(&self) -> &SystemRegistry {
        &self.core.systems
    }

    /// Info of the last executed step.
    pub fn last_info(&self) -> UpdateInfo {
        self.core.info
    }

    /// Effective step size.
    pub fn step_size(&self) -> Duration {
        self.core.config.step_size
    }

    /// Register `record` against the world entity.
    pub fn add_system(&mut self, record: SystemRecord) -> Result<(), RunnerError> {
        let entity = self.core.world.unwrap_or(Entity::NULL);
        self.add_system_to(record, entity)
    }

    /// Register `record` against `entity`, running its configure phase.
    ///
    /// Rejected while the runner is inside [`run`](Self::run).
    pub fn add_system_to(&mut self, record: SystemRecord, entity: Entity) -> Result<(), RunnerError> {
        if self.core.control.is_running() {
            return Err(RegistryError::Running {
                name: record.name().to_owned(),
            }
            .into());
        }
        self.core.systems.add(record, entity, &mut self.ecm)?;
        self.sync_control();
        Ok(())
    }

    /// Request that [`run`](Self::run) return at the next step boundary.
    ///
    /// Idempotent; the step in flight completes. This cancels the shared
    /// [`CancellationToken`], so later runs return `Ok(0)` until its owner
    /// calls [`CancellationToken::reset`].
    pub fn stop(&self) {
        self.core.cancel.cancel();
    }

    /// Execute exactly one step outside of [`run`](Self::run).
    pub fn step(&mut self) -> UpdateInfo {
        if self.core.run_started.is_none() {
            self.core.run_started = Some(Instant::now());
        }
        let info = self.step_local();
        self.core.real_time_before = self.core.real_time();
        self.core.run_started = None;
        self.core.control.set_state(RunnerState::Stopped);
        info
    }

    /// Step until `iterations` steps have executed (`0`: until stopped).
    ///
    /// Returns the number of steps this call executed, `0` when the
    /// cancellation token is already cancelled. The token is never reset
    /// here: a [`stop`](Self::stop) racing with the start of a run must not
    /// be lost. A distributed primary first waits for its secondaries and
    /// handshakes with them; a secondary hands control to the network loop.
    pub fn run(&mut self, iterations: u64) -> Result<u64, RunnerError> {
        if self.core.control.is_running() {
            return Err(RunnerError::AlreadyRunning);
        }
        let initial = if self.core.control.paused() {
            RunnerState::Paused
        } else {
            RunnerState::Running
        };
        self.core.control.set_state(initial);
        self.core.run_started = Some(Instant::now());
        self.core.last_step_start = None;
        tracing::info!(
            world = self.core.control.name(),
            iterations,
            paused = self.core.control.paused(),
            "runner started"
        );

        let role = self.network.as_ref().map(NetworkManager::role);
        let result = match role {
            Some(NetworkRole::Secondary) => self.run_secondary(iterations),
            _ => self.run_local(iterations),
        };

        self.core.real_time_before = self.core.real_time();
        self.core.run_started = None;
        self.core.control.set_state(RunnerState::Stopped);
        tracing::info!(
            world = self.core.control.name(),
            executed = result.as_ref().copied().unwrap_or(0),
            iteration = self.core.info.iterations,
            "runner stopped"
        );
        result
    }

    fn run_local(&mut self, iterations: u64) -> Result<u64, RunnerError> {
        if !self.prepare_primary()? {
            return Ok(0);
        }
        let mut executed = 0;
        loop {
            if self.core.cancel.is_cancelled() || (iterations > 0 && executed >= iterations) {
                break;
            }
            if self.core.throttle() {
                break;
            }
            self.step_local();
            executed += 1;
        }
        Ok(executed)
    }

    /// Wait for discovery and handshake once. `Ok(false)` on cancellation.
    fn prepare_primary(&mut self) -> Result<bool, RunnerError> {
        if self.network_ready {
            return Ok(true);
        }
        let Some(primary) = self.network.as_mut().and_then(NetworkManager::as_primary_mut) else {
            return Ok(true);
        };
        match primary.wait_ready(&self.core.cancel) {
            Ok(()) => {}
            Err(NetworkError::Cancelled) => return Ok(false),
            Err(err) => return Err(err.into()),
        }
        let ready = primary.handshake()?;
        tracing::info!(world = self.core.control.name(), secondaries = ready, "network primary ready");
        self.network_ready = true;
        Ok(true)
    }

    fn run_secondary(&mut self, iterations: u64) -> Result<u64, RunnerError> {
        let Some(secondary) = self.network.as_mut().and_then(NetworkManager::as_secondary_mut) else {
            return Ok(0);
        };
        if !self.network_ready {
            match secondary.handshake(&self.core.cancel) {
                Ok(()) => self.network_ready = true,
                Err(NetworkError::Cancelled) => return Ok(0),
                Err(err) => return Err(err.into()),
            }
        }
        let core = &mut self.core;
        let cancel = core.cancel.clone();
        let executed = secondary.run(
            &mut self.ecm,
            |info, ecm| core.secondary_step(info, ecm),
            &cancel,
            iterations,
        );
        match executed {
            Ok(n) => Ok(n),
            Err(NetworkError::Cancelled) => Ok(0),
            Err(err) => Err(err.into()),
        }
    }

    fn step_local(&mut self) -> UpdateInfo {
        let primary = if self.network_ready {
            self.network.as_mut().and_then(NetworkManager::as_primary_mut)
        } else {
            None
        };
        self.core.step(&mut self.ecm, primary)
    }

    fn sync_control(&mut self) {
        self.core.refresh_names(&mut self.ecm, true);
        self.core.control.set_counts(
            self.core.info.iterations,
            self.ecm.entity_count(),
            self.core.systems.len(),
        );
    }
}

impl RunnerCore {
    /// Sleep until one update period after the last step start.
    ///
    /// Returns `true` if cancelled while waiting.
    fn throttle(&mut self) -> bool {
        let period = self.control.update_period();
        let Some(last) = self.last_step_start else {
            return false;
        };
        let elapsed = last.elapsed();
        if period > elapsed {
            return self.cancel.wait_timeout(period - elapsed);
        }
        false
    }

    fn real_time(&self) -> Duration {
        self.real_time_before + self.run_started.map_or(Duration::ZERO, |s| s.elapsed())
    }

    fn step(
        &mut self,
        ecm: &mut EntityComponentManager,
        primary: Option<&mut NetworkPrimary>,
    ) -> UpdateInfo {
        let start = Instant::now();
        self.last_step_start = Some(start);
        let mut metrics = StepMetrics::default();

        let paused = self.apply_control(ecm);
        let dt = if paused {
            Duration::ZERO
        } else {
            self.config.step_size
        };
        let info = UpdateInfo {
            sim_time: self.info.sim_time + dt,
            real_time: self.real_time(),
            dt,
            iterations: self.info.iterations + 1,
            paused,
        };
        metrics.control_us = micros(start.elapsed());

        let mark = Instant::now();
        let mut failures = self.systems.run_pre_update(&info, ecm);
        metrics.pre_update_us = micros(mark.elapsed());

        if let Some(primary) = primary {
            let mark = Instant::now();
            match primary.step(&info, ecm, &self.cancel) {
                Ok(StepSync::TimedOut { .. }) => self.barrier_timeouts += 1,
                Ok(_) | Err(NetworkError::Cancelled) => {}
                Err(err) => tracing::error!(
                    world = self.control.name(),
                    iteration = info.iterations,
                    error = %err,
                    "network step failed"
                ),
            }
            metrics.barrier_us = micros(mark.elapsed());
        }

        failures += self.run_update_phases(&info, ecm, &mut metrics);
        self.finish(info, ecm, start, metrics, failures, true);
        info
    }

    /// One step driven by the primary's clock. Change flags are left set;
    /// the secondary clears them after building its acknowledgment.
    fn secondary_step(&mut self, info: &UpdateInfo, ecm: &mut EntityComponentManager) {
        let start = Instant::now();
        self.last_step_start = Some(start);
        let mut metrics = StepMetrics::default();
        self.apply_removals(ecm);
        self.control.set_state(RunnerState::Running);
        metrics.control_us = micros(start.elapsed());

        let mark = Instant::now();
        let mut failures = self.systems.run_pre_update(info, ecm);
        metrics.pre_update_us = micros(mark.elapsed());
        failures += self.run_update_phases(info, ecm, &mut metrics);
        self.finish(*info, ecm, start, metrics, failures, false);
    }

    fn run_update_phases(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
        metrics: &mut StepMetrics,
    ) -> usize {
        let mark = Instant::now();
        let mut failures = self.systems.run_update(info, ecm);
        metrics.update_us = micros(mark.elapsed());

        let mark = Instant::now();
        failures += self.systems.run_post_update(info, ecm);
        metrics.post_update_us = micros(mark.elapsed());
        failures
    }

    /// Apply queued removals and the pause/step requests. Returns whether
    /// this step runs paused.
    fn apply_control(&mut self, ecm: &mut EntityComponentManager) -> bool {
        self.apply_removals(ecm);
        if !self.control.paused() {
            self.control.set_state(RunnerState::Running);
            return false;
        }
        if self.control.take_step() {
            self.control.set_state(RunnerState::Stepping);
            return false;
        }
        self.control.set_state(RunnerState::Paused);
        true
    }

    fn apply_removals(&mut self, ecm: &mut EntityComponentManager) {
        for request in self.control.drain_removals() {
            let entity = match request.target {
                RemovalTarget::Entity(entity) => Some(entity),
                RemovalTarget::Name(name) => ecm.entity_by_name(&name),
            };
            match entity {
                Some(entity) if ecm.request_remove_entity(entity, request.recursive) => {}
                _ => tracing::warn!(
                    world = self.control.name(),
                    ?entity,
                    "removal requested for unknown entity"
                ),
            }
        }
    }

    fn finish(
        &mut self,
        info: UpdateInfo,
        ecm: &mut EntityComponentManager,
        start: Instant,
        mut metrics: StepMetrics,
        failures: usize,
        clear_changes: bool,
    ) {
        let mark = Instant::now();
        let removed = ecm.process_remove_entity_requests();
        ecm.advance_views();
        if clear_changes {
            ecm.set_all_components_unchanged();
        }
        self.refresh_names(ecm, false);
        metrics.maintenance_us = micros(mark.elapsed());

        self.info = info;
        self.control
            .set_counts(info.iterations, ecm.entity_count(), self.systems.len());

        let elapsed = start.elapsed();
        metrics.total_us = micros(elapsed);
        metrics.system_failures = u32::try_from(failures).unwrap_or(u32::MAX);
        metrics.entities_removed = u32::try_from(removed).unwrap_or(u32::MAX);

        let stats = WorldStatistics {
            sim_time: info.sim_time,
            real_time: info.real_time,
            real_time_factor: self.rtf.push(info.dt, elapsed),
            iterations: info.iterations,
            paused: info.paused,
            barrier_timeouts: self.barrier_timeouts,
        };
        tracing::trace!(
            world = self.control.name(),
            iteration = stats.iterations,
            sim_time = ?stats.sim_time,
            rtf = stats.real_time_factor,
            paused = stats.paused,
            "step complete"
        );
        self.control.publish(stats, metrics);
    }

    fn refresh_names(&self, ecm: &mut EntityComponentManager, force: bool) {
        if !ecm.take_structure_changed() && !force {
            return;
        }
        let mut names = IndexMap::new();
        ecm.scan::<(Name,)>(|entity, (name,)| {
            names.entry(name.0.clone()).or_insert(entity);
            true
        });
        self.control.set_names(names);
    }
}

impl std::fmt::Debug for SimulationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRunner")
            .field("name", &self.name())
            .field("state", &self.core.control.state())
            .field("iterations", &self.core.info.iterations)
            .field("entities", &self.ecm.entity_count())
            .field("systems", &self.core.systems.len())
            .finish_non_exhaustive()
    }
}
