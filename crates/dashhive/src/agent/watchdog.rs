// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Inactivity detection and the cooperative busy guard.
//!
//! The guard is advisory across suspension points in the single-threaded
//! agent loop, never a mutex: every multi-step action must take it on
//! entry and release it on all exit paths (including failure), or
//! overlapping task execution can occur. This is a liveness mechanism,
//! not a correctness guarantee.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::constants::IDLE_THRESHOLD;

/// Two-state execution guard for the agent loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BusyGuard {
    /// No multi-step action in flight.
    #[default]
    Idle,
    /// A multi-step action is in flight; don't start another.
    Executing,
}

impl BusyGuard {
    /// Whether an action is currently in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Executing)
    }

    /// Take the guard. Returns false when already executing.
    pub fn try_acquire(&mut self) -> bool {
        if self.is_busy() {
            return false;
        }
        *self = Self::Executing;
        true
    }

    /// Release the guard. Safe to call on every exit path.
    pub fn release(&mut self) {
        *self = Self::Idle;
    }
}

/// Qualifying activity kinds that reset the inactivity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// A decided action ran.
    Action,
    /// Liveness heartbeat.
    Heartbeat,
    /// The avatar moved.
    Movement,
    /// Dig, build or craft interaction.
    WorldInteraction,
}

/// Detects prolonged inactivity so the agent can force its default task.
#[derive(Debug)]
pub struct ActivityWatchdog {
    last_active: Instant,
    threshold: Duration,
}

impl Default for ActivityWatchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityWatchdog {
    /// Watchdog with the fleet's fixed 10-second idle threshold.
    pub fn new() -> Self {
        Self::with_threshold(IDLE_THRESHOLD)
    }

    /// Watchdog with a custom threshold (tests).
    #[must_use]
    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            last_active: Instant::now(),
            threshold,
        }
    }

    /// Record a qualifying activity event.
    pub fn touch(&mut self, activity: Activity) {
        debug!(?activity, "activity observed");
        self.last_active = Instant::now();
    }

    /// Time since the last qualifying activity.
    pub fn idle_for(&self) -> Duration {
        self.last_active.elapsed()
    }

    /// Whether the agent has been inactive past the threshold while not
    /// busy. Checked from the 1-second watchdog tick.
    pub fn is_stalled(&self, guard: BusyGuard) -> bool {
        !guard.is_busy() && self.idle_for() > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_check_and_set() {
        let mut guard = BusyGuard::default();
        assert!(!guard.is_busy());
        assert!(guard.try_acquire());
        assert!(guard.is_busy());

        // Second acquire is refused while executing.
        assert!(!guard.try_acquire());

        guard.release();
        assert!(guard.try_acquire());
    }

    #[test]
    fn test_stall_requires_idle_guard() {
        let mut watchdog = ActivityWatchdog::with_threshold(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));

        let mut guard = BusyGuard::default();
        assert!(watchdog.is_stalled(guard));

        // A busy agent is never considered stalled.
        guard.try_acquire();
        assert!(!watchdog.is_stalled(guard));

        // Activity resets the window.
        guard.release();
        watchdog.touch(Activity::Movement);
        let fresh = ActivityWatchdog::new();
        assert!(!fresh.is_stalled(guard));
    }
}
