//! # Auto-Refresh Scheduler
//!
//! Fires once every `interval_s` whole seconds of caller-supplied time.
//! An interval of zero or less disables it. The window restarts at the
//! instant it fires.

use chrono::{DateTime, Utc};

/// Periodic refresh timer
#[derive(Debug, Clone)]
pub struct AutoRefresh {
    interval_s: i64,
    window_start: DateTime<Utc>,
}

impl AutoRefresh {
    pub fn new(interval_s: i64, now: DateTime<Utc>) -> Self {
        Self {
            interval_s,
            window_start: now,
        }
    }

    pub fn interval_s(&self) -> i64 {
        self.interval_s
    }

    pub fn is_enabled(&self) -> bool {
        self.interval_s > 0
    }

    /// Change the interval without restarting the current window
    pub fn set_interval_s(&mut self, interval_s: i64) {
        self.interval_s = interval_s;
    }

    /// Whole seconds elapsed in the current window
    pub fn elapsed_s(&self, now: DateTime<Utc>) -> i64 {
        (now - self.window_start).num_seconds()
    }

    /// Returns `true` (and restarts the window) once the interval has elapsed
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_enabled() || self.elapsed_s(now) < self.interval_s {
            return false;
        }
        self.window_start = now;
        true
    }
}
