//! Wall clock and origin stamping
//!
//! Host broadcasts carry a wall-clock stamp so followers can compensate for
//! delivery latency and drop reordered updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of wall-clock time in milliseconds since the UNIX epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// The system wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// Get current time in milliseconds since UNIX epoch
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            now_ms: AtomicU64::new(start_ms),
        })
    }

    pub fn set_ms(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// Produces strictly increasing origin stamps for one sender.
///
/// If the wall clock stalls or steps backwards the next stamp is the previous
/// one plus a millisecond.
#[derive(Debug, Default)]
pub struct OriginStamper {
    last_ms: Option<u64>,
}

impl OriginStamper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self, now_ms: u64) -> u64 {
        let stamp = match self.last_ms {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_ms = Some(stamp);
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamps_strictly_increase() {
        let mut stamper = OriginStamper::new();
        assert_eq!(stamper.stamp(100), 100);
        assert_eq!(stamper.stamp(100), 101);
        // Clock stepped back
        assert_eq!(stamper.stamp(50), 102);
        assert_eq!(stamper.stamp(500), 500);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 1_250);
        clock.set_ms(10);
        assert_eq!(clock.now_ms(), 10);
    }
}
