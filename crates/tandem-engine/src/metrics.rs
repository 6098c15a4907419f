//! Per-step timing metrics for the simulation runner.
//!
//! [`StepMetrics`] captures where one step spent its wall-clock time,
//! phase by phase, for telemetry and profiling.

/// Timing data collected during a single step.
///
/// All durations are in microseconds. The runner fills these in after
/// each step; consumers read the most recent one from
/// [`WorldControl::metrics`](crate::WorldControl::metrics).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step.
    pub total_us: u64,
    /// Time applying queued control requests.
    pub control_us: u64,
    /// Time in the pre-update phase.
    pub pre_update_us: u64,
    /// Time blocked at the network barrier.
    pub barrier_us: u64,
    /// Time in the update phase.
    pub update_us: u64,
    /// Time in the post-update phase.
    pub post_update_us: u64,
    /// Time compacting removals and advancing views.
    pub maintenance_us: u64,
    /// Systems that reported a failure this step.
    pub system_failures: u32,
    /// Entities erased at the end of the step.
    pub entities_removed: u32,
}

pub(crate) fn micros(d: std::time::Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn default_metrics_are_zero() {
        let m = StepMetrics::default();
        assert_eq!(m.total_us, 0);
        assert_eq!(m.barrier_us, 0);
        assert_eq!(m.system_failures, 0);
    }

    #[test]
    fn micros_saturates() {
        assert_eq!(micros(Duration::from_millis(3)), 3_000);
        assert_eq!(micros(Duration::MAX), u64::MAX);
    }
}
