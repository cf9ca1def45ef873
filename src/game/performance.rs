//! Tick budget monitoring
//!
//! Each room keeps a rolling window of tick compute times and compares the
//! average against its tick interval. Status changes are logged by the room.

use std::collections::VecDeque;
use std::time::Duration;

/// How much of the tick interval the simulation is using
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceStatus {
    /// Under half the budget
    Healthy,
    /// Over half the budget
    Busy,
    /// At or over the budget: ticks are being skipped
    Overloaded,
}

pub struct PerformanceMonitor {
    /// Rolling window of tick durations
    tick_durations: VecDeque<Duration>,
    max_samples: usize,
    /// Tick interval (budget)
    target_tick_duration: Duration,
    busy_threshold: f32,
    overload_threshold: f32,
    status: PerformanceStatus,
}

impl PerformanceMonitor {
    pub fn new(tick_rate: u32) -> Self {
        let target_tick_duration = Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32);
        // ~5 seconds of samples
        let max_samples = (tick_rate.max(1) * 5) as usize;

        Self {
            tick_durations: VecDeque::with_capacity(max_samples),
            max_samples,
            target_tick_duration,
            busy_threshold: 0.5,
            overload_threshold: 1.0,
            status: PerformanceStatus::Healthy,
        }
    }

    /// Record one tick's compute time. Returns the new status when it changed.
    pub fn record_tick(&mut self, duration: Duration) -> Option<PerformanceStatus> {
        self.tick_durations.push_back(duration);
        while self.tick_durations.len() > self.max_samples {
            self.tick_durations.pop_front();
        }

        let previous = self.status;
        self.update_status();
        (self.status != previous).then_some(self.status)
    }

    fn update_status(&mut self) {
        if self.tick_durations.len() < 10 {
            // Not enough data yet
            return;
        }

        let ratio = self.budget_usage_percent() / 100.0;
        self.status = if ratio < self.busy_threshold {
            PerformanceStatus::Healthy
        } else if ratio < self.overload_threshold {
            PerformanceStatus::Busy
        } else {
            PerformanceStatus::Overloaded
        };
    }

    pub fn average_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.tick_durations.iter().sum();
        sum / self.tick_durations.len() as u32
    }

    /// 95th percentile tick duration
    pub fn p95_tick_duration(&self) -> Duration {
        if self.tick_durations.is_empty() {
            return Duration::ZERO;
        }
        let mut sorted: Vec<_> = self.tick_durations.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f32 * 0.95) as usize;
        sorted.get(idx.min(sorted.len() - 1)).copied().unwrap_or(Duration::ZERO)
    }

    pub fn status(&self) -> PerformanceStatus {
        self.status
    }

    /// Average budget usage as a percentage (0-100+)
    pub fn budget_usage_percent(&self) -> f32 {
        let avg = self.average_tick_duration();
        (avg.as_secs_f32() / self.target_tick_duration.as_secs_f32()) * 100.0
    }

    pub fn status_message(&self) -> String {
        format!(
            "{:?} - {:.1}% budget, p95 {:.2}ms",
            self.status,
            self.budget_usage_percent(),
            self.p95_tick_duration().as_secs_f64() * 1000.0
        )
    }
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(crate::game::constants::room::TICK_RATE)
    }
}
