//! The primary's acknowledgment barrier.
//!
//! Acknowledgments arrive on the ack-pump thread and are buffered per
//! iteration. The stepping thread blocks in [`AckBarrier::wait`] until
//! every expected secondary has acknowledged the iteration, the timeout
//! elapses, or the cancellation token fires. One mutex guards the buffer
//! and one condvar wakes the waiter on every arrival or expectation change.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use indexmap::{IndexMap, IndexSet};
use parking_lot::{Condvar, Mutex};

use tandem_core::CancellationToken;

use crate::message::SecondaryStep;

/// How often a blocked waiter re-checks the cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Result of [`AckBarrier::wait`].
#[derive(Debug)]
pub enum BarrierOutcome {
    /// Every expected secondary acknowledged. Acks sorted by prefix.
    Complete(Vec<SecondaryStep>),
    /// The timeout elapsed first.
    TimedOut {
        /// Expected prefixes with no ack for the iteration.
        missing: Vec<String>,
        /// Acks that did arrive, sorted by prefix.
        received: Vec<SecondaryStep>,
    },
    /// The cancellation token fired while waiting.
    Cancelled,
}

#[derive(Default)]
struct State {
    epoch: u64,
    expected: IndexSet<String>,
    arrivals: BTreeMap<u64, IndexMap<String, SecondaryStep>>,
}

impl State {
    fn missing(&self, iteration: u64) -> Vec<String> {
        let acked = self.arrivals.get(&iteration);
        self.expected
            .iter()
            .filter(|p| !acked.is_some_and(|a| a.contains_key(*p)))
            .cloned()
            .collect()
    }

    /// Remove and return the acks for `iteration`, discarding anything older.
    fn take(&mut self, iteration: u64) -> Vec<SecondaryStep> {
        let mut acks: Vec<SecondaryStep> = self
            .arrivals
            .remove(&iteration)
            .map(|m| m.into_values().collect())
            .unwrap_or_default();
        self.arrivals = self.arrivals.split_off(&iteration.saturating_add(1));
        acks.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        acks
    }
}

/// Per-iteration acknowledgment buffer with a bounded, cancellable wait.
#[derive(Default)]
pub struct AckBarrier {
    state: Mutex<State>,
    cv: Condvar,
}

impl AckBarrier {
    /// Create a barrier expecting nobody, at epoch 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of secondaries every iteration must hear from.
    pub fn register_expectation(&self, peers: impl IntoIterator<Item = String>) {
        let mut state = self.state.lock();
        state.expected = peers.into_iter().collect();
        self.cv.notify_all();
    }

    /// Start a new epoch: drop all buffered acks and ignore older ones.
    pub fn begin_epoch(&self, epoch: u64) {
        let mut state = self.state.lock();
        state.epoch = epoch;
        state.arrivals.clear();
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Buffer an acknowledgment.
    ///
    /// Returns `false` (and drops it) if it belongs to another epoch.
    pub fn record_arrival(&self, ack: SecondaryStep) -> bool {
        let mut state = self.state.lock();
        if ack.epoch != state.epoch {
            tracing::trace!(
                prefix = %ack.prefix,
                ack_epoch = ack.epoch,
                epoch = state.epoch,
                "discarding ack from another epoch"
            );
            return false;
        }
        state
            .arrivals
            .entry(ack.info.iterations)
            .or_default()
            .insert(ack.prefix.clone(), ack);
        self.cv.notify_all();
        true
    }

    /// Stop expecting `prefix` in this and future iterations.
    ///
    /// Returns `false` if it was not expected.
    pub fn drop_peer(&self, prefix: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.expected.shift_remove(prefix);
        self.cv.notify_all();
        removed
    }

    /// Prefixes currently expected.
    pub fn expected(&self) -> Vec<String> {
        self.state.lock().expected.iter().cloned().collect()
    }

    /// Number of iterations with buffered acks.
    pub fn buffered_iterations(&self) -> usize {
        self.state.lock().arrivals.len()
    }

    /// Block until every expected secondary acknowledged `iteration`, the
    /// `timeout` elapses, or `cancel` fires.
    ///
    /// On completion or timeout the buffered acks for `iteration` and all
    /// earlier iterations are consumed.
    pub fn wait(
        &self,
        iteration: u64,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> BarrierOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if state.missing(iteration).is_empty() {
                return BarrierOutcome::Complete(state.take(iteration));
            }
            if cancel.is_cancelled() {
                return BarrierOutcome::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                let missing = state.missing(iteration);
                return BarrierOutcome::TimedOut {
                    missing,
                    received: state.take(iteration),
                };
            }
            let wake = deadline.min(now + CANCEL_POLL);
            self.cv.wait_until(&mut state, wake);
        }
    }
}

impl std::fmt::Debug for AckBarrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AckBarrier")
            .field("epoch", &state.epoch)
            .field("expected", &state.expected)
            .field("buffered_iterations", &state.arrivals.len())
            .finish()
    }
}
