//! Feedback suppression for the host
//!
//! When the hub echoes a sender's broadcasts back to it, the host would
//! otherwise reconcile against its own, slightly stale, state right after a
//! local action. The guard opens a short window around each local action
//! during which incoming updates are dropped.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct FeedbackGuard {
    window: Duration,
    /// Inert when the hub never echoes
    enabled: bool,
    suppress_until: Option<Instant>,
    /// Updates dropped while armed
    suppressed_count: u64,
}

impl FeedbackGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            enabled: true,
            suppress_until: None,
            suppressed_count: 0,
        }
    }

    /// A guard that never suppresses
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open (or extend) the suppression window from `now`
    pub fn arm(&mut self, now: Instant) {
        if !self.enabled {
            return;
        }
        let until = now + self.window;
        if self.suppress_until.map_or(true, |current| until > current) {
            self.suppress_until = Some(until);
        }
    }

    pub fn is_suppressing(&self, now: Instant) -> bool {
        self.enabled && self.suppress_until.is_some_and(|until| now < until)
    }

    /// Check an incoming update and count it if it is dropped
    pub fn admit(&mut self, now: Instant) -> bool {
        if self.is_suppressing(now) {
            self.suppressed_count += 1;
            debug!("Feedback guard: dropped update ({} so far)", self.suppressed_count);
            false
        } else {
            true
        }
    }

    /// Whether an echo was ever caught inside the window
    pub fn echo_observed(&self) -> bool {
        self.suppressed_count > 0
    }

    pub fn suppressed_count(&self) -> u64 {
        self.suppressed_count
    }
}
