//! Transport abstraction and the in-process [`LocalBus`].
//!
//! The protocol needs four channels: discovery, a per-secondary control
//! service (`<prefix>/control`), a broadcast `step` topic and a `step_ack`
//! topic back to the primary. [`PrimaryTransport`] and
//! [`SecondaryTransport`] expose exactly that.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::message::{prefix_of, ControlRequest, PeerControl, PeerEvent, SecondaryStep, SimulationStep};

/// Primary side of a transport.
pub trait PrimaryTransport: Send {
    /// Identities of the secondaries currently discovered, in discovery order.
    fn peers(&self) -> Vec<String>;

    /// Call `<prefix>/control` and wait up to `timeout` for the reply.
    fn request_control(
        &self,
        prefix: &str,
        request: PeerControl,
        timeout: Duration,
    ) -> Result<PeerControl, TransportError>;

    /// Broadcast a step message to every secondary.
    fn publish_step(&self, step: &SimulationStep) -> Result<(), TransportError>;

    /// Acknowledgments and disconnect notices from secondaries.
    fn events(&self) -> Receiver<PeerEvent>;
}

/// Secondary side of a transport.
pub trait SecondaryTransport: Send {
    /// This secondary's full identity.
    fn id(&self) -> &str;

    /// Whether exactly one primary is attached.
    fn primary_connected(&self) -> bool;

    /// Incoming requests on this secondary's control service.
    fn control_requests(&self) -> Receiver<ControlRequest>;

    /// Incoming step messages.
    fn steps(&self) -> Receiver<SimulationStep>;

    /// Send a step acknowledgment to the primary.
    fn publish_ack(&self, ack: SecondaryStep) -> Result<(), TransportError>;
}

impl<T: PrimaryTransport + ?Sized> PrimaryTransport for Box<T> {
    fn peers(&self) -> Vec<String> {
        (**self).peers()
    }

    fn request_control(
        &self,
        prefix: &str,
        request: PeerControl,
        timeout: Duration,
    ) -> Result<PeerControl, TransportError> {
        (**self).request_control(prefix, request, timeout)
    }

    fn publish_step(&self, step: &SimulationStep) -> Result<(), TransportError> {
        (**self).publish_step(step)
    }

    fn events(&self) -> Receiver<PeerEvent> {
        (**self).events()
    }
}

impl<T: SecondaryTransport + ?Sized> SecondaryTransport for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn primary_connected(&self) -> bool {
        (**self).primary_connected()
    }

    fn control_requests(&self) -> Receiver<ControlRequest> {
        (**self).control_requests()
    }

    fn steps(&self) -> Receiver<SimulationStep> {
        (**self).steps()
    }

    fn publish_ack(&self, ack: SecondaryStep) -> Result<(), TransportError> {
        (**self).publish_ack(ack)
    }
}

// ── LocalBus ───────────────────────────────────────────────────────

struct SecondarySlot {
    id: String,
    control: Sender<ControlRequest>,
    steps: Sender<SimulationStep>,
}

#[derive(Default)]
struct BusState {
    primary: Option<Sender<PeerEvent>>,
    secondaries: IndexMap<String, SecondarySlot>,
}

/// In-process transport connecting one primary and any number of
/// secondaries running on threads of the same process.
///
/// Cloning the bus shares it. Dropping a [`LocalSecondary`] deregisters
/// it and notifies the primary with [`PeerEvent::Disconnected`].
#[derive(Clone, Default)]
pub struct LocalBus {
    state: Arc<Mutex<BusState>>,
}

impl LocalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the primary endpoint, replacing any previous one.
    pub fn primary(&self) -> LocalPrimary {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        self.state.lock().primary = Some(events_tx);
        LocalPrimary {
            bus: self.clone(),
            events: events_rx,
        }
    }

    /// Attach a secondary endpoint with identity `id`.
    pub fn secondary(&self, id: impl Into<String>) -> LocalSecondary {
        let id = id.into();
        let prefix = prefix_of(&id);
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (steps_tx, steps_rx) = crossbeam_channel::unbounded();
        self.state.lock().secondaries.insert(
            prefix.clone(),
            SecondarySlot {
                id: id.clone(),
                control: control_tx,
                steps: steps_tx,
            },
        );
        LocalSecondary {
            bus: self.clone(),
            id,
            prefix,
            control: control_rx,
            steps: steps_rx,
        }
    }

    /// Number of attached secondaries.
    pub fn secondary_count(&self) -> usize {
        self.state.lock().secondaries.len()
    }
}

/// Primary endpoint of a [`LocalBus`].
pub struct LocalPrimary {
    bus: LocalBus,
    events: Receiver<PeerEvent>,
}

impl PrimaryTransport for LocalPrimary {
    fn peers(&self) -> Vec<String> {
        self.bus
            .state
            .lock()
            .secondaries
            .values()
            .map(|s| s.id.clone())
            .collect()
    }

    fn request_control(
        &self,
        prefix: &str,
        request: PeerControl,
        timeout: Duration,
    ) -> Result<PeerControl, TransportError> {
        let control = self
            .bus
            .state
            .lock()
            .secondaries
            .get(prefix)
            .map(|s| s.control.clone())
            .ok_or_else(|| TransportError::UnknownPeer(prefix.to_owned()))?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        control
            .send(ControlRequest {
                request,
                reply: reply_tx,
            })
            .map_err(|_| TransportError::Closed)?;
        reply_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => TransportError::Timeout(timeout),
            RecvTimeoutError::Disconnected => TransportError::Closed,
        })
    }

    fn publish_step(&self, step: &SimulationStep) -> Result<(), TransportError> {
        let state = self.bus.state.lock();
        for slot in state.secondaries.values() {
            // A secondary that dropped its receiver is reported via Disconnected.
            let _ = slot.steps.send(step.clone());
        }
        Ok(())
    }

    fn events(&self) -> Receiver<PeerEvent> {
        self.events.clone()
    }
}

impl Drop for LocalPrimary {
    fn drop(&mut self) {
        self.bus.state.lock().primary = None;
    }
}

/// Secondary endpoint of a [`LocalBus`].
pub struct LocalSecondary {
    bus: LocalBus,
    id: String,
    prefix: String,
    control: Receiver<ControlRequest>,
    steps: Receiver<SimulationStep>,
}

impl SecondaryTransport for LocalSecondary {
    fn id(&self) -> &str {
        &self.id
    }

    fn primary_connected(&self) -> bool {
        self.bus.state.lock().primary.is_some()
    }

    fn control_requests(&self) -> Receiver<ControlRequest> {
        self.control.clone()
    }

    fn steps(&self) -> Receiver<SimulationStep> {
        self.steps.clone()
    }

    fn publish_ack(&self, ack: SecondaryStep) -> Result<(), TransportError> {
        let primary = self.bus.state.lock().primary.clone();
        match primary {
            Some(tx) => tx.send(PeerEvent::Ack(ack)).map_err(|_| TransportError::Closed),
            None => Err(TransportError::Closed),
        }
    }
}

impl Drop for LocalSecondary {
    fn drop(&mut self) {
        let mut state = self.bus.state.lock();
        state.secondaries.shift_remove(&self.prefix);
        if let Some(primary) = &state.primary {
            let _ = primary.send(PeerEvent::Disconnected(self.prefix.clone()));
        }
    }
}
