//! The primary side of the lock-step protocol.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use indexmap::IndexMap;

use tandem_core::{CancellationToken, UpdateInfo};
use tandem_ecm::EntityComponentManager;

use crate::affinity::assign_affinities;
use crate::barrier::{AckBarrier, BarrierOutcome};
use crate::config::NetworkConfig;
use crate::error::NetworkError;
use crate::message::{prefix_of, PeerControl, PeerEvent, SecondaryStep, SimulationStep};
use crate::transport::PrimaryTransport;

/// How often [`NetworkPrimary::wait_ready`] polls discovery.
const DISCOVERY_POLL: Duration = Duration::from_millis(10);

/// What the primary knows about one secondary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondaryControl {
    /// Handshake completed and the peer has not disconnected.
    pub ready: bool,
    /// Full peer identity.
    pub id: String,
    /// Namespace prefix (first 8 characters of `id`).
    pub prefix: String,
    /// Missed the most recent barrier it was expected at.
    pub stale: bool,
    /// Barriers released by timeout while this peer was missing.
    pub missed_barriers: u64,
    /// Still attached to the transport.
    pub connected: bool,
}

/// Outcome of one [`NetworkPrimary::step`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepSync {
    /// No barrier this iteration (paused, or before the first step message).
    Skipped,
    /// Every ready secondary acknowledged; their state was applied.
    Synchronized {
        /// Number of acknowledgments applied.
        acks: usize,
    },
    /// The barrier timed out; the primary proceeded without these peers.
    TimedOut {
        /// Prefixes that did not acknowledge in time.
        missing: Vec<String>,
    },
}

/// Primary network manager.
///
/// Owns the [`AckBarrier`] and a background `tandem-ack-pump` thread that
/// moves acknowledgments from the transport into it.
pub struct NetworkPrimary {
    config: NetworkConfig,
    transport: Box<dyn PrimaryTransport>,
    secondaries: IndexMap<String, SecondaryControl>,
    barrier: Arc<AckBarrier>,
    disconnects: Receiver<String>,
    pump_stop: Option<Sender<()>>,
    pump: Option<JoinHandle<()>>,
    next_iteration: u64,
    was_paused: bool,
    epoch: u64,
    near_misses: u64,
}

impl NetworkPrimary {
    /// Create a primary over `transport` and start the ack pump.
    pub fn new(
        config: NetworkConfig,
        transport: impl PrimaryTransport + 'static,
    ) -> Result<Self, NetworkError> {
        config.validate()?;
        let barrier = Arc::new(AckBarrier::new());
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let (disconnect_tx, disconnect_rx) = crossbeam_channel::unbounded();
        let events = transport.events();
        let pump_barrier = Arc::clone(&barrier);
        let pump = thread::Builder::new()
            .name("tandem-ack-pump".into())
            .spawn(move || ack_pump(events, stop_rx, pump_barrier, disconnect_tx))
            .map_err(|_| NetworkError::Spawn("ack pump"))?;
        Ok(Self {
            config,
            transport: Box::new(transport),
            secondaries: IndexMap::new(),
            barrier,
            disconnects: disconnect_rx,
            pump_stop: Some(stop_tx),
            pump: Some(pump),
            next_iteration: 0,
            was_paused: true,
            epoch: 0,
            near_misses: 0,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Whether the expected number of secondaries has been discovered.
    pub fn ready(&self) -> bool {
        self.transport.peers().len() == self.config.num_secondaries_expected
    }

    /// Block until [`ready`](Self::ready), the discovery timeout, or cancellation.
    pub fn wait_ready(&self, cancel: &CancellationToken) -> Result<(), NetworkError> {
        let deadline = Instant::now() + self.config.discovery_timeout;
        loop {
            if self.ready() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                let found = self.transport.peers().len();
                tracing::error!(
                    found,
                    expected = self.config.num_secondaries_expected,
                    "secondary discovery timed out"
                );
                return Err(NetworkError::DiscoveryTimedOut {
                    found,
                    expected: self.config.num_secondaries_expected,
                });
            }
            if cancel.wait_timeout(DISCOVERY_POLL) {
                return Err(NetworkError::Cancelled);
            }
        }
    }

    /// Enable simulation on every discovered secondary.
    ///
    /// Each peer gets a [`SecondaryControl`] entry whether or not it
    /// answers; only those that do are expected at the barrier. Returns the
    /// number of ready secondaries, or [`NetworkError::HandshakeFailed`]
    /// naming the ones that did not answer.
    pub fn handshake(&mut self) -> Result<usize, NetworkError> {
        let mut failed = Vec::new();
        for id in self.transport.peers() {
            let prefix = prefix_of(&id);
            tracing::debug!(%prefix, "registering secondary");
            let response = self.transport.request_control(
                &prefix,
                PeerControl { enable_sim: true },
                self.config.handshake_timeout,
            );
            let ready = match response {
                Ok(resp) if resp.enable_sim => {
                    tracing::info!(%prefix, "peer initialized");
                    true
                }
                Ok(_) => {
                    tracing::error!(%prefix, "peer refused to enable simulation");
                    false
                }
                Err(err) => {
                    tracing::error!(%prefix, error = %err, "peer handshake failed");
                    false
                }
            };
            if !ready {
                failed.push(prefix.clone());
            }
            self.secondaries.insert(
                prefix.clone(),
                SecondaryControl {
                    ready,
                    id,
                    prefix,
                    stale: false,
                    missed_barriers: 0,
                    connected: true,
                },
            );
        }
        self.secondaries.sort_keys();
        self.barrier.register_expectation(self.ready_prefixes());
        if failed.is_empty() {
            Ok(self.ready_prefixes().len())
        } else {
            Err(NetworkError::HandshakeFailed(failed))
        }
    }

    /// Per-secondary state, ordered by prefix.
    pub fn secondaries(&self) -> &IndexMap<String, SecondaryControl> {
        &self.secondaries
    }

    /// Barriers released by timeout so far.
    pub fn near_misses(&self) -> u64 {
        self.near_misses
    }

    /// Current step-message epoch. Zero until the first message is sent.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Synchronize iteration `info.iterations` with the secondaries.
    ///
    /// Called between pre-update and update. Sends a step message every
    /// half run-ahead window and whenever the world resumes from a pause,
    /// then waits at the barrier if the iteration is covered by one.
    pub fn step(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
        cancel: &CancellationToken,
    ) -> Result<StepSync, NetworkError> {
        self.process_disconnects();

        let pending = self
            .secondaries
            .values()
            .filter(|s| s.connected && !s.ready)
            .count();
        if pending > 0 || self.secondaries.len() < self.config.num_secondaries_expected {
            let ready = self.ready_prefixes().len();
            tracing::error!(
                ready,
                expected = self.config.num_secondaries_expected,
                "stepping network primary before all peers are ready"
            );
            return Err(NetworkError::NotReady {
                ready,
                expected: self.config.num_secondaries_expected,
            });
        }

        let half_window = (self.config.secondary_iterations / 2).max(1);
        if (info.iterations % half_window == 0 || self.was_paused) && !info.paused {
            self.publish(info, ecm)?;
        }
        self.was_paused = info.paused;

        if info.paused || info.iterations < self.next_iteration || self.epoch == 0 {
            return Ok(StepSync::Skipped);
        }
        self.next_iteration = info.iterations + 1;

        match self
            .barrier
            .wait(info.iterations, self.config.barrier_timeout, cancel)
        {
            BarrierOutcome::Complete(acks) => {
                let count = acks.len();
                for ack in &acks {
                    if let Some(control) = self.secondaries.get_mut(&ack.prefix) {
                        control.stale = false;
                    }
                }
                self.apply(info, acks, ecm)?;
                Ok(StepSync::Synchronized { acks: count })
            }
            BarrierOutcome::TimedOut { missing, received } => {
                tracing::warn!(
                    iteration = info.iterations,
                    missing = ?missing,
                    timeout = ?self.config.barrier_timeout,
                    "barrier timed out, proceeding without secondaries"
                );
                self.near_misses += 1;
                for prefix in &missing {
                    if let Some(control) = self.secondaries.get_mut(prefix) {
                        control.stale = true;
                        control.missed_barriers += 1;
                    }
                }
                self.apply(info, received, ecm)?;
                Ok(StepSync::TimedOut { missing })
            }
            BarrierOutcome::Cancelled => Err(NetworkError::Cancelled),
        }
    }

    fn ready_prefixes(&self) -> Vec<String> {
        self.secondaries
            .values()
            .filter(|s| s.ready)
            .map(|s| s.prefix.clone())
            .collect()
    }

    fn process_disconnects(&mut self) {
        while let Ok(prefix) = self.disconnects.try_recv() {
            if let Some(control) = self.secondaries.get_mut(&prefix) {
                control.ready = false;
                control.connected = false;
            }
            tracing::warn!(%prefix, "secondary disconnected; its performers are not reassigned");
        }
    }

    fn publish(
        &mut self,
        info: &UpdateInfo,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), NetworkError> {
        if self.was_paused {
            self.epoch += 1;
            self.barrier.begin_epoch(self.epoch);
            self.next_iteration = info.iterations;
            tracing::debug!(epoch = self.epoch, iteration = info.iterations, "new step epoch");
        }
        let affinities = assign_affinities(ecm, &self.ready_prefixes());
        let step = SimulationStep {
            info: *info,
            max_iterations: info.iterations + self.config.secondary_iterations,
            affinities,
            epoch: self.epoch,
        };
        self.transport.publish_step(&step)?;
        Ok(())
    }

    fn apply(
        &self,
        info: &UpdateInfo,
        acks: Vec<SecondaryStep>,
        ecm: &mut EntityComponentManager,
    ) -> Result<(), NetworkError> {
        if let Some(bad) = acks
            .iter()
            .find(|a| a.info.sim_time != info.sim_time || a.info.dt != info.dt)
        {
            tracing::error!(
                prefix = %bad.prefix,
                iteration = info.iterations,
                "secondaries are running asynchronously and their simulation time is different"
            );
            return Err(NetworkError::Desynchronized {
                prefix: bad.prefix.clone(),
                expected: info.sim_time,
                found: bad.info.sim_time,
                expected_dt: info.dt,
                found_dt: bad.info.dt,
            });
        }
        for ack in acks {
            ecm.set_state(ack.state);
        }
        Ok(())
    }
}

impl Drop for NetworkPrimary {
    fn drop(&mut self) {
        drop(self.pump_stop.take());
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for NetworkPrimary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPrimary")
            .field("secondaries", &self.secondaries)
            .field("epoch", &self.epoch)
            .field("next_iteration", &self.next_iteration)
            .field("near_misses", &self.near_misses)
            .finish()
    }
}

/// Moves transport events into the barrier until stopped.
fn ack_pump(
    events: Receiver<PeerEvent>,
    stop: Receiver<()>,
    barrier: Arc<AckBarrier>,
    disconnects: Sender<String>,
) {
    loop {
        crossbeam_channel::select! {
            recv(events) -> event => match event {
                Ok(PeerEvent::Ack(ack)) => {
                    barrier.record_arrival(ack);
                }
                Ok(PeerEvent::Disconnected(prefix)) => {
                    let _ = disconnects.send(prefix.clone());
                    barrier.drop_peer(&prefix);
                }
                Err(_) => break,
            },
            recv(stop) -> _ => break,
        }
    }
}
