//! Per-step world statistics and the real-time-factor window.

use std::time::Duration;

/// Published once per step through [`WorldControl`](crate::WorldControl).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WorldStatistics {
    /// Simulation time after the step.
    pub sim_time: Duration,
    /// Wall-clock time since the run started.
    pub real_time: Duration,
    /// Simulated over wall-clock time across the last `rtf_window` steps.
    pub real_time_factor: f64,
    /// Iteration of the step.
    pub iterations: u64,
    /// Whether the step ran paused.
    pub paused: bool,
    /// Barriers released by timeout since the run started (primary only).
    pub barrier_timeouts: u64,
}

/// Sliding window of `(sim dt, wall dt)` pairs.
#[derive(Debug)]
pub(crate) struct RtfWindow {
    window: Vec<(Duration, Duration)>,
    pos: usize,
    filled: usize,
    sim_total: Duration,
    real_total: Duration,
}

impl RtfWindow {
    pub fn new(size: usize) -> Self {
        Self {
            window: vec![(Duration::ZERO, Duration::ZERO); size.max(1)],
            pos: 0,
            filled: 0,
            sim_total: Duration::ZERO,
            real_total: Duration::ZERO,
        }
    }

    /// Record one step and return the factor over the window.
    pub fn push(&mut self, sim: Duration, real: Duration) -> f64 {
        let (old_sim, old_real) = self.window[self.pos];
        self.sim_total = self.sim_total.saturating_sub(old_sim) + sim;
        self.real_total = self.real_total.saturating_sub(old_real) + real;
        self.window[self.pos] = (sim, real);
        self.pos = (self.pos + 1) % self.window.len();
        self.filled = (self.filled + 1).min(self.window.len());
        self.factor()
    }

    /// Current factor; zero before any wall-clock time has been recorded.
    pub fn factor(&self) -> f64 {
        if self.real_total.is_zero() {
            return 0.0;
        }
        self.sim_total.as_secs_f64() / self.real_total.as_secs_f64()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn factor_averages_over_window() {
        let mut w = RtfWindow::new(4);
        for _ in 0..4 {
            w.push(MS, MS * 2);
        }
        assert!((w.factor() - 0.5).abs() < 1e-12);
        assert_eq!(w.len(), 4);
    }

    #[test]
    fn old_samples_fall_out() {
        let mut w = RtfWindow::new(2);
        w.push(MS * 10, MS);
        w.push(MS, MS);
        w.push(MS, MS);
        assert!((w.factor() - 1.0).abs() < 1e-12);
        assert_eq!(w.len(), 2);
    }

    #[test]
    fn paused_steps_pull_factor_to_zero() {
        let mut w = RtfWindow::new(3);
        assert_eq!(w.factor(), 0.0);
        for _ in 0..3 {
            w.push(Duration::ZERO, MS);
        }
        assert_eq!(w.factor(), 0.0);
    }
}
