//! Bandwidth meter: turns "N bytes observed" events into instantaneous and average speed.

use std::time::{Duration, Instant};

/// Length of the rolling window for the instantaneous speed.
const WINDOW: Duration = Duration::from_secs(1);

/// Throughput tracker fed once per progress event.
///
/// Instantaneous speed is measured over a rolling one-second window that restarts when
/// it elapses; average speed is cumulative bytes over cumulative time since `reset`.
#[derive(Debug, Clone)]
pub struct Bandwidth {
    started: Instant,
    window_start: Instant,
    window_bytes: u64,
    total_bytes: u64,
    speed: f64,
    average_speed: f64,
}

impl Default for Bandwidth {
    fn default() -> Self {
        Self::new()
    }
}

impl Bandwidth {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            window_start: now,
            window_bytes: 0,
            total_bytes: 0,
            speed: 0.0,
            average_speed: 0.0,
        }
    }

    /// Zero both counters and restart the timers.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn observe(&mut self, bytes: u64) {
        self.observe_at(bytes, Instant::now());
    }

    pub(crate) fn observe_at(&mut self, bytes: u64, now: Instant) {
        self.window_bytes += bytes;
        self.total_bytes += bytes;

        let window_elapsed = now.saturating_duration_since(self.window_start);
        // Floor at 1ms so a burst right after a window restart doesn't divide by zero.
        let window_secs = window_elapsed.as_secs_f64().max(0.001);
        self.speed = self.window_bytes as f64 / window_secs;
        if window_elapsed >= WINDOW {
            self.window_start = now;
            self.window_bytes = 0;
        }

        let total_secs = now
            .saturating_duration_since(self.started)
            .as_secs_f64()
            .max(0.001);
        self.average_speed = self.total_bytes as f64 / total_secs;
    }

    /// Bytes per second over the current window.
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Bytes per second since the last reset.
    pub fn average_speed(&self) -> f64 {
        self.average_speed
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_meter_is_zero() {
        let b = Bandwidth::new();
        assert_eq!(b.speed(), 0.0);
        assert_eq!(b.average_speed(), 0.0);
        assert_eq!(b.total_bytes(), 0);
    }

    #[test]
    fn average_is_cumulative_bytes_over_time() {
        let mut b = Bandwidth::new();
        let t0 = b.started;
        b.observe_at(1000, t0 + Duration::from_millis(500));
        b.observe_at(1000, t0 + Duration::from_secs(2));
        assert_eq!(b.total_bytes(), 2000);
        assert!((b.average_speed() - 1000.0).abs() < 1.0);
    }

    #[test]
    fn window_restarts_after_one_second() {
        let mut b = Bandwidth::new();
        let t0 = b.started;
        b.observe_at(500, t0 + Duration::from_millis(500));
        assert!((b.speed() - 1000.0).abs() < 1.0);
        // Window elapses: speed covers the whole window, then the window restarts.
        b.observe_at(500, t0 + Duration::from_millis(1000));
        assert!((b.speed() - 1000.0).abs() < 1.0);
        assert_eq!(b.window_bytes, 0);
        // New window only sees bytes observed after the restart.
        b.observe_at(100, t0 + Duration::from_millis(1100));
        assert!((b.speed() - 1000.0).abs() < 1.0);
    }

    #[test]
    fn reset_zeroes_counters() {
        let mut b = Bandwidth::new();
        b.observe(4096);
        assert!(b.total_bytes() > 0);
        b.reset();
        assert_eq!(b.total_bytes(), 0);
        assert_eq!(b.speed(), 0.0);
        assert_eq!(b.average_speed(), 0.0);
    }
}
