//! The per-step [`UpdateInfo`] record.

use std::time::Duration;

/// Immutable description of one simulation step.
///
/// Produced once per step by the simulation runner and handed read-only
/// to every system in every phase of that step. Secondaries receive the
/// same fields inside step messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateInfo {
    /// Absolute simulation time after this step's `dt` is applied.
    pub sim_time: Duration,
    /// Accumulated wall-clock time since the runner started.
    pub real_time: Duration,
    /// Simulation time advanced by this step. Zero while paused.
    pub dt: Duration,
    /// Step counter. Advances on every executed step, paused or not.
    pub iterations: u64,
    /// Whether the world was paused for this step.
    pub paused: bool,
}

impl UpdateInfo {
    /// `dt` in seconds, the unit most systems integrate with.
    pub fn dt_secs(&self) -> f64 {
        self.dt.as_secs_f64()
    }

    /// Simulation time in seconds.
    pub fn sim_time_secs(&self) -> f64 {
        self.sim_time.as_secs_f64()
    }
}
