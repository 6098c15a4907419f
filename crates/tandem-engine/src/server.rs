//! [`Server`]: owns every world of a process and exposes its control surface.
//!
//! Each world gets its own [`SimulationRunner`]. One world runs directly
//! on the calling thread (or on a `tandem-server` background thread);
//! several worlds run side by side on a [`WorkerPool`]. Queries and
//! commands go through each world's [`WorldControl`] and never wait for
//! a step to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use tandem_core::{CancellationToken, Entity};
use tandem_ecm::EntityComponentManager;
use tandem_network::{NetworkManager, NetworkPrimary, NetworkSecondary};
use tandem_system::{RegistryError, SystemRecord};

use crate::config::{NetworkEndpoint, NetworkSetup, ServerConfig};
use crate::control::WorldControl;
use crate::error::{RunnerError, ServerError};
use crate::pool::WorkerPool;
use crate::runner::SimulationRunner;
use crate::stats::WorldStatistics;

type SharedRunner = Arc<Mutex<SimulationRunner>>;

/// Clears the running flag when a run ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Process-level owner of all worlds.
pub struct Server {
    runners: Vec<SharedRunner>,
    controls: Vec<Arc<WorldControl>>,
    pool: Option<Arc<WorkerPool>>,
    cancel: CancellationToken,
    running: Arc<AtomicBool>,
    background: Option<JoinHandle<()>>,
}

impl Server {
    /// Validate `config` and load every world.
    ///
    /// Fails if the configuration is invalid, a world cannot be loaded,
    /// or the network manager or worker pool cannot start.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        // A world occupies its worker until it stops.
        let workers = config.resolved_worker_count().max(config.worlds.len());
        let ServerConfig {
            worlds,
            runner,
            network,
            loader,
            ..
        } = config;

        let cancel = CancellationToken::new();
        let mut runners = Vec::with_capacity(worlds.len());
        for desc in &worlds {
            let world =
                SimulationRunner::from_description(desc, runner.clone(), &loader, cancel.clone())?;
            runners.push(world);
        }
        if let Some(setup) = network {
            if let Some(first) = runners.first_mut() {
                first.set_network(network_manager(setup)?);
            }
        }

        let pool = if runners.len() > 1 {
            Some(Arc::new(WorkerPool::new(workers)?))
        } else {
            None
        };
        let controls = runners.iter().map(SimulationRunner::control).collect();
        tracing::info!(
            worlds = runners.len(),
            workers = pool.as_ref().map_or(0, |p| p.threads()),
            "server ready"
        );
        Ok(Self {
            runners: runners
                .into_iter()
                .map(|r| Arc::new(Mutex::new(r)))
                .collect(),
            controls,
            pool,
            cancel,
            running: Arc::new(AtomicBool::new(false)),
            background: None,
        })
    }

    /// Run every world for `iterations` steps (`0`: until stopped).
    ///
    /// With `blocking` the call returns when all worlds have stopped;
    /// otherwise the worlds run on a background thread and errors are
    /// logged. `paused` sets every world's initial pause state.
    pub fn run(&mut self, blocking: bool, iterations: u64, paused: bool) -> Result<(), ServerError> {
        self.reap();
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ServerError::AlreadyRunning);
        }
        let guard = RunningGuard(Arc::clone(&self.running));
        self.cancel.reset();
        for control in &self.controls {
            control.set_paused(paused);
        }

        let runners = self.runners.clone();
        let pool = self.pool.clone();
        if blocking {
            let _guard = guard;
            return run_worlds(&runners, pool.as_deref(), iterations);
        }
        let handle = thread::Builder::new()
            .name("tandem-server".into())
            .spawn(move || {
                let _guard = guard;
                if let Err(err) = run_worlds(&runners, pool.as_deref(), iterations) {
                    tracing::error!(error = %err, "server run failed");
                }
            })
            .map_err(|_| ServerError::Spawn("server"))?;
        self.background = Some(handle);
        Ok(())
    }

    /// Cancel every world and wait for a background run to end. Idempotent.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.background.take() {
            let _ = handle.join();
        }
    }

    /// Whether a run is in progress.
    pub fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Token that stops every world when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of worlds.
    pub fn world_count(&self) -> usize {
        self.runners.len()
    }

    /// Control handle of world `world`.
    pub fn control(&self, world: usize) -> Option<Arc<WorldControl>> {
        self.controls.get(world).cloned()
    }

    /// Whether world `world` is inside its step loop.
    pub fn running_world(&self, world: usize) -> Option<bool> {
        self.controls.get(world).map(|c| c.is_running())
    }

    /// Whether world `world` is paused.
    pub fn paused(&self, world: usize) -> Option<bool> {
        self.controls.get(world).map(|c| c.paused())
    }

    /// Pause or resume world `world`.
    pub fn set_paused(&self, paused: bool, world: usize) -> Result<(), ServerError> {
        self.world_control(world)?.set_paused(paused);
        Ok(())
    }

    /// Run `steps` unpaused steps of paused world `world`.
    pub fn request_steps(&self, steps: u64, world: usize) -> Result<(), ServerError> {
        self.world_control(world)?.request_steps(steps);
        Ok(())
    }

    /// Iteration of the last step of world `world`.
    pub fn iteration_count(&self, world: usize) -> Option<u64> {
        self.controls.get(world).map(|c| c.iterations())
    }

    /// Entities in world `world`.
    pub fn entity_count(&self, world: usize) -> Option<usize> {
        self.controls.get(world).map(|c| c.entity_count())
    }

    /// Systems registered in world `world`.
    pub fn system_count(&self, world: usize) -> Option<usize> {
        self.controls.get(world).map(|c| c.system_count())
    }

    /// Register `record` against the world entity of world `world`.
    ///
    /// Rejected while the server is running.
    pub fn add_system(&self, record: SystemRecord, world: usize) -> Result<(), ServerError> {
        let runner = self.runner(world)?;
        if self.running() {
            return Err(RunnerError::from(RegistryError::Running {
                name: record.name().to_owned(),
            })
            .into());
        }
        runner.lock().add_system(record)?;
        Ok(())
    }

    /// Whether world `world` has an entity called `name`.
    pub fn has_entity(&self, name: &str, world: usize) -> bool {
        self.controls.get(world).is_some_and(|c| c.has_entity(name))
    }

    /// First entity called `name` in world `world`.
    pub fn entity_by_name(&self, name: &str, world: usize) -> Option<Entity> {
        self.controls.get(world)?.entity_by_name(name)
    }

    /// Remove `entity` from world `world` at its next step.
    pub fn request_remove_entity(
        &self,
        entity: Entity,
        recursive: bool,
        world: usize,
    ) -> Result<(), ServerError> {
        self.world_control(world)?
            .request_remove_entity(entity, recursive);
        Ok(())
    }

    /// Remove the entity called `name` from world `world` at its next step.
    ///
    /// `Ok(false)` if the name is unknown.
    pub fn request_remove_entity_by_name(
        &self,
        name: &str,
        recursive: bool,
        world: usize,
    ) -> Result<bool, ServerError> {
        Ok(self
            .world_control(world)?
            .request_remove_entity_by_name(name, recursive))
    }

    /// Change the throttling period of world `world`.
    pub fn set_update_period(&self, period: Duration, world: usize) -> Result<(), ServerError> {
        self.world_control(world)?.set_update_period(period);
        Ok(())
    }

    /// Statistics of the last step of world `world`.
    pub fn statistics(&self, world: usize) -> Option<WorldStatistics> {
        self.controls.get(world).map(|c| c.statistics())
    }

    /// Per-step statistics feed of world `world`.
    pub fn subscribe_statistics(&self, world: usize) -> Option<Receiver<WorldStatistics>> {
        self.controls.get(world).map(|c| c.subscribe())
    }

    /// Run `f` against the state of world `world`. Only while stopped.
    pub fn with_ecm<R>(
        &self,
        world: usize,
        f: impl FnOnce(&mut EntityComponentManager) -> R,
    ) -> Result<R, ServerError> {
        let runner = self.runner(world)?;
        if self.running() {
            return Err(ServerError::AlreadyRunning);
        }
        let mut runner = runner.lock();
        Ok(runner.with_ecm(f))
    }

    fn runner(&self, world: usize) -> Result<&SharedRunner, ServerError> {
        self.runners.get(world).ok_or(ServerError::WorldIndex {
            index: world,
            count: self.runners.len(),
        })
    }

    fn world_control(&self, world: usize) -> Result<&WorldControl, ServerError> {
        self.controls
            .get(world)
            .map(Arc::as_ref)
            .ok_or(ServerError::WorldIndex {
                index: world,
                count: self.controls.len(),
            })
    }

    /// Join a background run that has already finished.
    fn reap(&mut self) {
        if self.running() {
            return;
        }
        if let Some(handle) = self.background.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("worlds", &self.controls)
            .field("running", &self.running())
            .finish_non_exhaustive()
    }
}

fn network_manager(setup: NetworkSetup) -> Result<NetworkManager, ServerError> {
    let NetworkSetup { config, endpoint } = setup;
    Ok(match endpoint {
        NetworkEndpoint::Primary(transport) => NetworkPrimary::new(config, transport)?.into(),
        NetworkEndpoint::Secondary(transport) => NetworkSecondary::new(config, transport).into(),
    })
}

fn run_worlds(
    runners: &[SharedRunner],
    pool: Option<&WorkerPool>,
    iterations: u64,
) -> Result<(), ServerError> {
    match pool {
        Some(pool) if runners.len() > 1 => {
            let results = pool.map(runners.to_vec(), move |runner| runner.lock().run(iterations))?;
            for result in results {
                result?;
            }
        }
        _ => {
            for runner in runners {
                runner.lock().run(iterations)?;
            }
        }
    }
    Ok(())
}
