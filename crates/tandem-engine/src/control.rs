//! [`WorldControl`]: the thread-safe handle operators use to observe and
//! steer one running world.
//!
//! The runner owns the world and reads requests from this handle at the
//! top of every step; everything else (queries, statistics) is published
//! by the runner at the end of every step. No lock is held across a step.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use tandem_core::Entity;

use crate::metrics::StepMetrics;
use crate::stats::WorldStatistics;

/// Scheduling state of a runner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunnerState {
    /// Not inside `run`.
    Stopped = 0,
    /// Stepping with simulation time advancing.
    Running = 1,
    /// Stepping with `dt == 0`.
    Paused = 2,
    /// Paused, but executing requested unpaused steps.
    Stepping = 3,
}

impl RunnerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::Stepping,
            _ => Self::Stopped,
        }
    }
}

/// Target of a queued removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RemovalTarget {
    Entity(Entity),
    Name(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RemovalRequest {
    pub target: RemovalTarget,
    pub recursive: bool,
}

/// Shared control and observation handle for one world.
pub struct WorldControl {
    name: String,
    state: AtomicU8,
    paused: AtomicBool,
    pending_steps: AtomicU64,
    iterations: AtomicU64,
    entity_count: AtomicUsize,
    system_count: AtomicUsize,
    update_period_ns: AtomicU64,
    statistics: Mutex<WorldStatistics>,
    metrics: Mutex<StepMetrics>,
    removals: Mutex<Vec<RemovalRequest>>,
    names: RwLock<IndexMap<String, Entity>>,
    stats_tx: Sender<WorldStatistics>,
    stats_rx: Receiver<WorldStatistics>,
}

impl WorldControl {
    pub(crate) fn new(name: impl Into<String>, update_period: Duration, stats_capacity: usize) -> Self {
        let (stats_tx, stats_rx) = crossbeam_channel::bounded(stats_capacity.max(1));
        Self {
            name: name.into(),
            state: AtomicU8::new(RunnerState::Stopped as u8),
            paused: AtomicBool::new(false),
            pending_steps: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            entity_count: AtomicUsize::new(0),
            system_count: AtomicUsize::new(0),
            update_period_ns: AtomicU64::new(nanos(update_period)),
            statistics: Mutex::new(WorldStatistics::default()),
            metrics: Mutex::new(StepMetrics::default()),
            removals: Mutex::new(Vec::new()),
            names: RwLock::new(IndexMap::new()),
            stats_tx,
            stats_rx,
        }
    }

    /// World name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current scheduling state.
    pub fn state(&self) -> RunnerState {
        RunnerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the runner is inside `run`.
    pub fn is_running(&self) -> bool {
        self.state() != RunnerState::Stopped
    }

    /// Whether the world is (or will start) paused.
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause or resume from the next step on.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Queue `n` unpaused steps to run while paused.
    pub fn request_steps(&self, n: u64) {
        self.pending_steps.fetch_add(n, Ordering::AcqRel);
    }

    /// Requested steps not yet executed.
    pub fn pending_steps(&self) -> u64 {
        self.pending_steps.load(Ordering::Acquire)
    }

    /// Iteration of the last executed step.
    pub fn iterations(&self) -> u64 {
        self.iterations.load(Ordering::Acquire)
    }

    /// Entities in the world after the last step.
    pub fn entity_count(&self) -> usize {
        self.entity_count.load(Ordering::Acquire)
    }

    /// Registered systems.
    pub fn system_count(&self) -> usize {
        self.system_count.load(Ordering::Acquire)
    }

    /// Minimum wall-clock time between step starts.
    pub fn update_period(&self) -> Duration {
        Duration::from_nanos(self.update_period_ns.load(Ordering::Acquire))
    }

    /// Change the throttling period; zero runs as fast as possible.
    pub fn set_update_period(&self, period: Duration) {
        self.update_period_ns.store(nanos(period), Ordering::Release);
    }

    /// Statistics of the last step.
    pub fn statistics(&self) -> WorldStatistics {
        *self.statistics.lock()
    }

    /// Timings of the last step.
    pub fn metrics(&self) -> StepMetrics {
        self.metrics.lock().clone()
    }

    /// Per-step statistics feed.
    ///
    /// The feed is bounded and drops its oldest entry when full. All
    /// receivers share one queue: each entry goes to one of them.
    pub fn subscribe(&self) -> Receiver<WorldStatistics> {
        self.stats_rx.clone()
    }

    /// Queue removal of `entity` at the start of the next step.
    pub fn request_remove_entity(&self, entity: Entity, recursive: bool) {
        self.removals.lock().push(RemovalRequest {
            target: RemovalTarget::Entity(entity),
            recursive,
        });
    }

    /// Queue removal of the entity called `name`.
    ///
    /// Returns `false`, queueing nothing, if no entity had that name after
    /// the last step.
    pub fn request_remove_entity_by_name(&self, name: &str, recursive: bool) -> bool {
        if !self.names.read().contains_key(name) {
            return false;
        }
        self.removals.lock().push(RemovalRequest {
            target: RemovalTarget::Name(name.to_owned()),
            recursive,
        });
        true
    }

    /// First entity called `name` as of the last step.
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.names.read().get(name).copied()
    }

    /// Whether an entity called `name` existed after the last step.
    pub fn has_entity(&self, name: &str) -> bool {
        self.names.read().contains_key(name)
    }

    // ── Runner side ────────────────────────────────────────────────

    pub(crate) fn set_state(&self, state: RunnerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Consume one requested step, if any.
    pub(crate) fn take_step(&self) -> bool {
        self.pending_steps
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub(crate) fn drain_removals(&self) -> Vec<RemovalRequest> {
        std::mem::take(&mut *self.removals.lock())
    }

    pub(crate) fn set_counts(&self, iterations: u64, entities: usize, systems: usize) {
        self.iterations.store(iterations, Ordering::Release);
        self.entity_count.store(entities, Ordering::Release);
        self.system_count.store(systems, Ordering::Release);
    }

    pub(crate) fn set_names(&self, names: IndexMap<String, Entity>) {
        *self.names.write() = names;
    }

    pub(crate) fn publish(&self, stats: WorldStatistics, metrics: StepMetrics) {
        *self.statistics.lock() = stats;
        *self.metrics.lock() = metrics;
        if let Err(TrySendError::Full(stats)) = self.stats_tx.try_send(stats) {
            let _ = self.stats_rx.try_recv();
            let _ = self.stats_tx.try_send(stats);
        }
    }
}

impl std::fmt::Debug for WorldControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldControl")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("paused", &self.paused())
            .field("iterations", &self.iterations())
            .finish()
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> WorldControl {
        WorldControl::new("w", Duration::from_millis(1), 2)
    }

    #[test]
    fn requested_steps_are_consumed_one_at_a_time() {
        let c = control();
        assert!(!c.take_step());
        c.request_steps(2);
        assert!(c.take_step());
        assert!(c.take_step());
        assert!(!c.take_step());
        assert_eq!(c.pending_steps(), 0);
    }

    #[test]
    fn stats_feed_drops_oldest_when_full() {
        let c = control();
        let rx = c.subscribe();
        for i in 1..=3 {
            c.publish(
                WorldStatistics {
                    iterations: i,
                    ..WorldStatistics::default()
                },
                StepMetrics::default(),
            );
        }
        assert_eq!(rx.try_recv().unwrap().iterations, 2);
        assert_eq!(rx.try_recv().unwrap().iterations, 3);
        assert!(rx.try_recv().is_err());
        assert_eq!(c.statistics().iterations, 3);
    }

    #[test]
    fn removal_by_name_requires_a_known_name() {
        let c = control();
        assert!(!c.request_remove_entity_by_name("box", true));
        let mut names = IndexMap::new();
        names.insert("box".to_owned(), Entity(4));
        c.set_names(names);
        assert!(c.has_entity("box"));
        assert_eq!(c.entity_by_name("box"), Some(Entity(4)));
        assert!(c.request_remove_entity_by_name("box", true));
        c.request_remove_entity(Entity(9), false);
        let drained = c.drain_removals();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].target, RemovalTarget::Name("box".into()));
        assert!(c.drain_removals().is_empty());
    }

    #[test]
    fn state_round_trips_through_atomic() {
        let c = control();
        assert_eq!(c.state(), RunnerState::Stopped);
        for s in [RunnerState::Running, RunnerState::Paused, RunnerState::Stepping] {
            c.set_state(s);
            assert_eq!(c.state(), s);
            assert!(c.is_running());
        }
    }

    #[test]
    fn update_period_is_settable() {
        let c = control();
        c.set_update_period(Duration::ZERO);
        assert_eq!(c.update_period(), Duration::ZERO);
        c.set_update_period(Duration::from_micros(250));
        assert_eq!(c.update_period(), Duration::from_micros(250));
    }
}
