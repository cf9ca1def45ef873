//! Process-wide simulation counters
//!
//! Updated by every room tick task and read by whoever embeds the server.
//! Text output follows the Prometheus exposition format so an outer HTTP
//! layer can serve it as-is.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Samples kept for tick time percentiles
const TICK_HISTORY_LEN: usize = 1000;

#[derive(Debug)]
pub struct Metrics {
    // Rooms and players
    pub rooms_active: AtomicU64,
    pub rooms_racing: AtomicU64,
    pub players_total: AtomicU64,
    pub bots_total: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Simulation events
    pub collisions_total: AtomicU64,
    pub pickups_total: AtomicU64,
    pub laps_total: AtomicU64,
    pub finishes_total: AtomicU64,
    pub matches_completed: AtomicU64,
    pub cars_sanitized: AtomicU64,

    // Input
    pub inputs_applied: AtomicU64,
    pub inputs_superseded: AtomicU64,
    pub inputs_rejected: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub rooms_active: u64,
    pub rooms_racing: u64,
    pub players_total: u64,
    pub bots_total: u64,
    pub tick_time_us: u64,
    pub tick_time_p95_us: u64,
    pub tick_time_p99_us: u64,
    pub tick_time_max_us: u64,
    pub tick_count: u64,
    pub collisions_total: u64,
    pub pickups_total: u64,
    pub laps_total: u64,
    pub finishes_total: u64,
    pub matches_completed: u64,
    pub cars_sanitized: u64,
    pub inputs_applied: u64,
    pub inputs_superseded: u64,
    pub inputs_rejected: u64,
    pub uptime_seconds: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rooms_active: AtomicU64::new(0),
            rooms_racing: AtomicU64::new(0),
            players_total: AtomicU64::new(0),
            bots_total: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            collisions_total: AtomicU64::new(0),
            pickups_total: AtomicU64::new(0),
            laps_total: AtomicU64::new(0),
            finishes_total: AtomicU64::new(0),
            matches_completed: AtomicU64::new(0),
            cars_sanitized: AtomicU64::new(0),
            inputs_applied: AtomicU64::new(0),
            inputs_superseded: AtomicU64::new(0),
            inputs_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY_LEN)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        if n > 0 {
            counter.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Saturating decrement for gauges
    pub fn decrement(counter: &AtomicU64, n: u64) {
        let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(n)));
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            rooms_active: load(&self.rooms_active),
            rooms_racing: load(&self.rooms_racing),
            players_total: load(&self.players_total),
            bots_total: load(&self.bots_total),
            tick_time_us: load(&self.tick_time_us),
            tick_time_p95_us: load(&self.tick_time_p95_us),
            tick_time_p99_us: load(&self.tick_time_p99_us),
            tick_time_max_us: load(&self.tick_time_max_us),
            tick_count: load(&self.tick_count),
            collisions_total: load(&self.collisions_total),
            pickups_total: load(&self.pickups_total),
            laps_total: load(&self.laps_total),
            finishes_total: load(&self.finishes_total),
            matches_completed: load(&self.matches_completed),
            cars_sanitized: load(&self.cars_sanitized),
            inputs_applied: load(&self.inputs_applied),
            inputs_superseded: load(&self.inputs_superseded),
            inputs_rejected: load(&self.inputs_rejected),
            uptime_seconds: self.uptime_seconds(),
        }
    }

    /// Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("maze_racer_rooms_active", "Rooms currently open", "gauge", s.rooms_active);
        metric!("maze_racer_rooms_racing", "Rooms with a race in progress", "gauge", s.rooms_racing);
        metric!("maze_racer_players_total", "Players in rooms", "gauge", s.players_total);
        metric!("maze_racer_players_bot", "Bot players in rooms", "gauge", s.bots_total);

        metric!("maze_racer_tick_time_microseconds", "Last tick time in microseconds", "gauge", s.tick_time_us);
        metric!("maze_racer_tick_time_p95_microseconds", "95th percentile tick time", "gauge", s.tick_time_p95_us);
        metric!("maze_racer_tick_time_p99_microseconds", "99th percentile tick time", "gauge", s.tick_time_p99_us);
        metric!("maze_racer_tick_time_max_microseconds", "Maximum tick time", "gauge", s.tick_time_max_us);
        metric!("maze_racer_tick_count", "Total ticks processed", "counter", s.tick_count);

        metric!("maze_racer_collisions_total", "Car contacts resolved", "counter", s.collisions_total);
        metric!("maze_racer_pickups_total", "Bonuses picked up", "counter", s.pickups_total);
        metric!("maze_racer_laps_total", "Laps completed", "counter", s.laps_total);
        metric!("maze_racer_finishes_total", "Players finished", "counter", s.finishes_total);
        metric!("maze_racer_matches_completed_total", "Matches ended", "counter", s.matches_completed);
        metric!("maze_racer_cars_sanitized_total", "Car states rolled back", "counter", s.cars_sanitized);
        metric!("maze_racer_inputs_applied_total", "Inputs consumed by ticks", "counter", s.inputs_applied);
        metric!("maze_racer_inputs_superseded_total", "Inputs overwritten before a tick used them", "counter", s.inputs_superseded);
        metric!("maze_racer_inputs_rejected_total", "Inputs dropped as invalid", "counter", s.inputs_rejected);
        metric!("maze_racer_uptime_seconds", "Server uptime in seconds", "counter", s.uptime_seconds);

        output
    }

    /// JSON format
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
