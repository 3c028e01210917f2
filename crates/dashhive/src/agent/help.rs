// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Requester-side help protocol.
//!
//! One request at a time: `Requested → (wait window elapses) → Fallback`.
//! The requester never learns whether assistance actually arrived; when
//! the window closes and its busy guard is still clear, it unconditionally
//! resumes autonomous behavior. The fallback fires exactly once per
//! request.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::constants::HELP_WAIT;
use crate::messages::HelpRequest;

use super::watchdog::BusyGuard;

#[derive(Debug)]
struct Pending {
    request: HelpRequest,
    since: Instant,
}

/// Tracks the lifecycle of the agent's outstanding help request.
#[derive(Debug)]
pub struct HelpState {
    pending: Option<Pending>,
    wait: Duration,
}

impl Default for HelpState {
    fn default() -> Self {
        Self::new()
    }
}

impl HelpState {
    /// State with the fleet's fixed 30-second wait window.
    pub fn new() -> Self {
        Self::with_wait(HELP_WAIT)
    }

    /// State with a custom window (tests).
    #[must_use]
    pub fn with_wait(wait: Duration) -> Self {
        Self {
            pending: None,
            wait,
        }
    }

    /// Whether a request is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start tracking `request`. Returns false when one is already
    /// outstanding — the agent loop is single-threaded, so a second
    /// request before the first window closes is collapsed into it.
    pub fn begin(&mut self, request: HelpRequest) -> bool {
        if self.pending.is_some() {
            warn!(resource = %request.resource, "help already pending, request collapsed");
            return false;
        }
        info!(resource = %request.resource, "requested help");
        self.pending = Some(Pending {
            request,
            since: Instant::now(),
        });
        true
    }

    /// Check the wait window from the watchdog tick.
    ///
    /// When the window has elapsed and the busy guard is clear, the
    /// pending request is consumed and returned so the caller runs its
    /// fallback — exactly once. A busy agent keeps the request parked
    /// until a later tick finds the guard clear.
    pub fn take_due_fallback(&mut self, guard: BusyGuard) -> Option<HelpRequest> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|pending| pending.since.elapsed() >= self.wait);
        if !due || guard.is_busy() {
            return None;
        }

        let pending = self.pending.take()?;
        warn!(
            resource = %pending.request.resource,
            "no help observed within the wait window, falling back"
        );
        Some(pending.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_fires_exactly_once() {
        let mut help = HelpState::with_wait(Duration::from_millis(0));
        assert!(help.begin(HelpRequest::resource_gather("iron_ore")));
        assert!(help.is_pending());

        std::thread::sleep(Duration::from_millis(2));
        let guard = BusyGuard::default();
        let fallback = help.take_due_fallback(guard).unwrap();
        assert_eq!(fallback.resource, "iron_ore");

        // Consumed: never fires a second time.
        assert!(help.take_due_fallback(guard).is_none());
        assert!(!help.is_pending());
    }

    #[test]
    fn test_window_not_elapsed_keeps_pending() {
        let mut help = HelpState::with_wait(Duration::from_secs(3600));
        help.begin(HelpRequest::resource_gather("oak_log"));
        assert!(help.take_due_fallback(BusyGuard::default()).is_none());
        assert!(help.is_pending());
    }

    #[test]
    fn test_busy_guard_parks_fallback() {
        let mut help = HelpState::with_wait(Duration::from_millis(0));
        help.begin(HelpRequest::resource_gather("stone"));
        std::thread::sleep(Duration::from_millis(2));

        let mut guard = BusyGuard::default();
        guard.try_acquire();
        assert!(help.take_due_fallback(guard).is_none());
        assert!(help.is_pending());

        guard.release();
        assert!(help.take_due_fallback(guard).is_some());
    }

    #[test]
    fn test_second_request_collapsed_while_pending() {
        let mut help = HelpState::with_wait(Duration::from_secs(3600));
        assert!(help.begin(HelpRequest::resource_gather("stone")));
        assert!(!help.begin(HelpRequest::resource_gather("iron_ore")));
    }
}
