//! The secondary side of the lock-step protocol.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use indexmap::IndexSet;

use tandem_core::{CancellationToken, Entity, UpdateInfo};
use tandem_ecm::EntityComponentManager;

use crate::config::NetworkConfig;
use crate::error::{NetworkError, TransportError};
use crate::message::{prefix_of, ControlRequest, PeerControl, SecondaryStep, SimulationStep};
use crate::transport::SecondaryTransport;

/// How often blocked waits re-check the cancellation token.
const POLL: Duration = Duration::from_millis(10);

/// Secondary network manager.
///
/// Executes local steps on behalf of the primary, up to the run-ahead
/// bound of the last step message, and acknowledges each iteration with
/// the changed state of its performers' models.
pub struct NetworkSecondary {
    config: NetworkConfig,
    transport: Box<dyn SecondaryTransport>,
    prefix: String,
    enabled: bool,
    performers: IndexSet<Entity>,
    epoch: Option<u64>,
    info: UpdateInfo,
    max_iteration: u64,
}

impl NetworkSecondary {
    /// Create a secondary over `transport`.
    pub fn new(config: NetworkConfig, transport: impl SecondaryTransport + 'static) -> Self {
        let prefix = prefix_of(transport.id());
        Self {
            config,
            transport: Box::new(transport),
            prefix,
            enabled: false,
            performers: IndexSet::new(),
            epoch: None,
            info: UpdateInfo::default(),
            max_iteration: 0,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// This secondary's namespace prefix.
    pub fn namespace(&self) -> &str {
        &self.prefix
    }

    /// Whether exactly one primary is attached.
    pub fn ready(&self) -> bool {
        self.transport.primary_connected()
    }

    /// Whether the primary enabled simulation.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Performers assigned to this secondary.
    pub fn performers(&self) -> impl Iterator<Item = Entity> + '_ {
        self.performers.iter().copied()
    }

    /// Next iteration this secondary will execute.
    pub fn iterations(&self) -> u64 {
        self.info.iterations
    }

    /// Block until the primary enables simulation or `cancel` fires.
    pub fn handshake(&mut self, cancel: &CancellationToken) -> Result<(), NetworkError> {
        let control = self.transport.control_requests();
        while !self.enabled {
            if cancel.is_cancelled() {
                return Err(NetworkError::Cancelled);
            }
            match control.recv_timeout(POLL) {
                Ok(request) => self.serve_control(request),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(NetworkError::Transport(TransportError::Closed))
                }
            }
        }
        tracing::info!(prefix = %self.prefix, "simulation enabled by primary");
        Ok(())
    }

    /// Run local steps until `iterations` have executed (`0`: until
    /// cancelled).
    ///
    /// `step` runs one full local step with the given info and must not
    /// clear component change flags; this method does that after sending
    /// each acknowledgment. Returns the number of steps executed.
    pub fn run<F>(
        &mut self,
        ecm: &mut EntityComponentManager,
        mut step: F,
        cancel: &CancellationToken,
        iterations: u64,
    ) -> Result<u64, NetworkError>
    where
        F: FnMut(&UpdateInfo, &mut EntityComponentManager),
    {
        let steps = self.transport.steps();
        let control = self.transport.control_requests();
        let mut executed = 0;
        loop {
            if cancel.is_cancelled() || (iterations > 0 && executed >= iterations) {
                return Ok(executed);
            }
            while let Ok(msg) = steps.try_recv() {
                self.apply_step_message(msg, ecm);
            }
            while let Ok(request) = control.try_recv() {
                self.serve_control(request);
            }
            if self.info.iterations < self.max_iteration {
                self.step_once(ecm, &mut step)?;
                executed += 1;
                continue;
            }
            self.wait_for_primary(&steps, &control, ecm)?;
        }
    }

    fn wait_for_primary(
        &mut self,
        steps: &Receiver<SimulationStep>,
        control: &Receiver<ControlRequest>,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), NetworkError> {
        crossbeam_channel::select! {
            recv(steps) -> msg => match msg {
                Ok(msg) => self.apply_step_message(msg, ecm),
                Err(_) => return Err(NetworkError::Transport(TransportError::Closed)),
            },
            recv(control) -> request => {
                if let Ok(request) = request {
                    self.serve_control(request);
                }
            },
            default(POLL) => {}
        }
        Ok(())
    }

    fn serve_control(&mut self, request: ControlRequest) {
        self.enabled = request.request.enable_sim;
        let _ = request.reply.send(PeerControl {
            enable_sim: self.enabled,
        });
    }

    fn apply_step_message(&mut self, msg: SimulationStep, ecm: &mut EntityComponentManager) {
        if self.epoch != Some(msg.epoch) {
            tracing::debug!(
                prefix = %self.prefix,
                epoch = msg.epoch,
                iteration = msg.info.iterations,
                "resynchronizing with primary"
            );
            self.epoch = Some(msg.epoch);
            self.info.iterations = msg.info.iterations;
            self.info.sim_time = msg.info.sim_time;
        }
        self.max_iteration = msg.max_iterations;
        self.info.dt = msg.info.dt;
        self.info.real_time = msg.info.real_time;
        self.info.paused = false;

        for affinity in msg.affinities {
            if affinity.secondary_prefix == self.prefix {
                if self.performers.insert(affinity.performer) {
                    tracing::info!(
                        prefix = %self.prefix,
                        performer = %affinity.performer,
                        "assigned affinity to performer"
                    );
                }
                continue;
            }
            if let Some(model) = ecm.parent(affinity.performer) {
                ecm.request_remove_entity(model, true);
            }
            if self.performers.shift_remove(&affinity.performer) {
                tracing::info!(
                    prefix = %self.prefix,
                    performer = %affinity.performer,
                    "unassigned affinity to performer"
                );
            }
        }
    }

    fn step_once<F>(&mut self, ecm: &mut EntityComponentManager, step: &mut F) -> Result<(), NetworkError>
    where
        F: FnMut(&UpdateInfo, &mut EntityComponentManager),
    {
        step(&self.info, ecm);

        let mut entities = IndexSet::new();
        for performer in &self.performers {
            if let Some(model) = ecm.parent(*performer) {
                entities.extend(ecm.descendants(model));
            }
        }
        let state = if entities.is_empty() {
            Default::default()
        } else {
            ecm.state(entities, false)
        };
        self.transport.publish_ack(SecondaryStep {
            prefix: self.prefix.clone(),
            info: self.info,
            epoch: self.epoch.unwrap_or_default(),
            state,
        })?;
        ecm.set_all_components_unchanged();

        self.info.iterations += 1;
        self.info.sim_time += self.info.dt;
        Ok(())
    }
}

impl std::fmt::Debug for NetworkSecondary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSecondary")
            .field("prefix", &self.prefix)
            .field("enabled", &self.enabled)
            .field("performers", &self.performers)
            .field("epoch", &self.epoch)
            .field("iterations", &self.info.iterations)
            .field("max_iteration", &self.max_iteration)
            .finish()
    }
}
