//! Messages exchanged between primary and secondaries.

use crossbeam_channel::Sender;

use tandem_core::{Entity, UpdateInfo};
use tandem_ecm::StateDelta;

/// Number of leading identity characters used as a secondary's namespace.
pub const PREFIX_LEN: usize = 8;

/// Namespace prefix for a peer identity: its first [`PREFIX_LEN`] characters.
pub fn prefix_of(id: &str) -> String {
    id.chars().take(PREFIX_LEN).collect()
}

/// Control request/response on `<prefix>/control`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PeerControl {
    /// Whether the secondary may start simulating.
    pub enable_sim: bool,
}

/// A control request together with its reply channel.
#[derive(Debug)]
pub struct ControlRequest {
    /// The request.
    pub request: PeerControl,
    /// Where the secondary sends its response.
    pub reply: Sender<PeerControl>,
}

/// One performer-to-secondary assignment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Affinity {
    /// The performer entity.
    pub performer: Entity,
    /// Prefix of the secondary that simulates it.
    pub secondary_prefix: String,
}

/// Primary → secondaries: permission to run up to `max_iterations`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulationStep {
    /// The primary's update info for the iteration this message was sent at.
    pub info: UpdateInfo,
    /// Secondaries may execute iterations strictly below this bound.
    pub max_iterations: u64,
    /// New assignments; empty after the first assignment.
    pub affinities: Vec<Affinity>,
    /// Bumped every time the primary resumes from a pause. Secondaries
    /// resynchronize their clock when it changes.
    pub epoch: u64,
}

/// Secondary → primary: one iteration done.
#[derive(Clone, Debug)]
pub struct SecondaryStep {
    /// Sender's prefix.
    pub prefix: String,
    /// The update info the secondary stepped with.
    pub info: UpdateInfo,
    /// Epoch of the step message the iteration belongs to.
    pub epoch: u64,
    /// Changed components of the secondary's performer models.
    pub state: StateDelta,
}

/// Events delivered to the primary.
#[derive(Clone, Debug)]
pub enum PeerEvent {
    /// A step acknowledgment.
    Ack(SecondaryStep),
    /// The secondary with this prefix went away.
    Disconnected(String),
}
