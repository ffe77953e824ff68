//! Host broadcasting
//!
//! Decides when the host pushes its state to the hub: immediately on a user
//! action, once per debounce window while scrubbing, and on a low-frequency
//! heartbeat otherwise. Timers themselves live in the session driver; this
//! type only tracks deadlines so it can be tested without a runtime.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::clock::OriginStamper;
use crate::player::Player;
use crate::sync::{PlaybackState, SyncPlayback};

/// Own origin stamps remembered for echo detection
const RECENT_ORIGINS: usize = 32;

/// Something that may warrant a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTrigger {
    /// Discrete play, pause or finished seek
    Action,
    /// One step of a continuous scrub
    Scrub,
    /// Position notification from the player
    TimeUpdate,
}

/// Trailing-edge state of a scrub burst
#[derive(Debug, Clone, Copy)]
struct ScrubWindow {
    until: Instant,
    /// A scrub arrived after the leading broadcast
    pending: bool,
}

#[derive(Debug)]
pub struct HostBroadcaster {
    identity: String,
    heartbeat: Duration,
    debounce: Duration,
    stamper: OriginStamper,
    last_broadcast: Option<Instant>,
    scrub: Option<ScrubWindow>,
    recent_origins: VecDeque<u64>,
    sent: u64,
}

impl HostBroadcaster {
    pub fn new(identity: impl Into<String>, heartbeat: Duration, debounce: Duration) -> Self {
        Self {
            identity: identity.into(),
            heartbeat,
            debounce,
            stamper: OriginStamper::new(),
            last_broadcast: None,
            scrub: None,
            recent_origins: VecDeque::with_capacity(RECENT_ORIGINS),
            sent: 0,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat
    }

    /// Whether `trigger` should broadcast right now
    pub fn on_trigger(&mut self, trigger: HostTrigger, now: Instant) -> bool {
        match trigger {
            HostTrigger::Action => {
                // The action's broadcast carries the latest state
                self.scrub = None;
                true
            }
            HostTrigger::Scrub => match self.scrub.as_mut() {
                Some(window) if now < window.until => {
                    window.pending = true;
                    window.until = now + self.debounce;
                    false
                }
                _ => {
                    self.scrub = Some(ScrubWindow {
                        until: now + self.debounce,
                        pending: false,
                    });
                    true
                }
            },
            HostTrigger::TimeUpdate => self
                .last_broadcast
                .map_or(true, |last| now.duration_since(last) >= self.heartbeat),
        }
    }

    /// When the pending scrub burst should flush, if any
    pub fn trailing_deadline(&self) -> Option<Instant> {
        self.scrub.map(|window| window.until)
    }

    /// Close the scrub window. Returns whether a trailing broadcast is owed.
    pub fn on_trailing_deadline(&mut self) -> bool {
        self.scrub.take().is_some_and(|window| window.pending)
    }

    /// Snapshot the player into a stamped `SyncPlayback` and record the send
    pub fn compose(&mut self, player: &dyn Player, now: Instant, now_ms: u64) -> SyncPlayback {
        let local = player.snapshot();
        let origin_ms = self.stamper.stamp(now_ms);
        self.last_broadcast = Some(now);
        self.sent += 1;
        if self.recent_origins.len() == RECENT_ORIGINS {
            self.recent_origins.pop_front();
        }
        self.recent_origins.push_back(origin_ms);

        debug!(
            "Broadcast #{}: playing={} position={:.3}s origin={}ms",
            self.sent, local.playing, local.position_seconds, origin_ms
        );

        SyncPlayback {
            identity: self.identity.clone(),
            state: PlaybackState::new(local.playing, local.position_seconds, origin_ms),
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Whether `origin_ms` is one of our recent broadcasts
    pub fn sent_origin(&self, origin_ms: u64) -> bool {
        self.recent_origins.contains(&origin_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::player::SimulatedPlayer;

    fn broadcaster() -> HostBroadcaster {
        HostBroadcaster::new("host", Duration::from_secs(1), Duration::from_millis(500))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_actions_always_broadcast() {
        let mut b = broadcaster();
        let t0 = Instant::now();
        assert!(b.on_trigger(HostTrigger::Action, t0));
        assert!(b.on_trigger(HostTrigger::Action, t0 + ms(10)));
    }

    #[test]
    fn test_scrub_burst_leading_and_trailing() {
        let mut b = broadcaster();
        let t0 = Instant::now();

        assert!(b.on_trigger(HostTrigger::Scrub, t0));
        for step in 1..=4 {
            assert!(!b.on_trigger(HostTrigger::Scrub, t0 + ms(50 * step)));
        }
        // Window trails the last scrub
        assert_eq!(b.trailing_deadline(), Some(t0 + ms(200) + ms(500)));
        assert!(b.on_trailing_deadline());
        assert_eq!(b.trailing_deadline(), None);
    }

    #[test]
    fn test_single_scrub_owes_no_trailing() {
        let mut b = broadcaster();
        let t0 = Instant::now();

        assert!(b.on_trigger(HostTrigger::Scrub, t0));
        assert!(!b.on_trailing_deadline());
    }

    #[test]
    fn test_action_cancels_pending_scrub() {
        let mut b = broadcaster();
        let t0 = Instant::now();

        b.on_trigger(HostTrigger::Scrub, t0);
        b.on_trigger(HostTrigger::Scrub, t0 + ms(100));
        assert!(b.on_trigger(HostTrigger::Action, t0 + ms(150)));
        assert_eq!(b.trailing_deadline(), None);
    }

    #[test]
    fn test_time_update_respects_heartbeat_interval() {
        let clock = ManualClock::new(5_000);
        let player = SimulatedPlayer::new(clock);
        let mut b = broadcaster();
        let t0 = Instant::now();

        assert!(b.on_trigger(HostTrigger::TimeUpdate, t0));
        b.compose(&player, t0, 5_000);
        assert!(!b.on_trigger(HostTrigger::TimeUpdate, t0 + ms(400)));
        assert!(b.on_trigger(HostTrigger::TimeUpdate, t0 + ms(1000)));
    }

    #[test]
    fn test_compose_stamps_increase() {
        let clock = ManualClock::new(5_000);
        let player = SimulatedPlayer::new(clock);
        player.place(42.0, true);
        let mut b = broadcaster();
        let t0 = Instant::now();

        let first = b.compose(&player, t0, 5_000);
        let second = b.compose(&player, t0, 5_000);
        assert_eq!(first.identity, "host");
        assert_eq!(first.state, PlaybackState::new(true, 42.0, 5_000));
        assert_eq!(second.state.origin_ms, 5_001);
        assert_eq!(b.sent(), 2);
    }

    #[test]
    fn test_recent_origins_bounded() {
        let clock = ManualClock::new(5_000);
        let player = SimulatedPlayer::new(clock);
        let mut b = broadcaster();
        let t0 = Instant::now();

        let first = b.compose(&player, t0, 5_000).state.origin_ms;
        assert!(b.sent_origin(first));
        assert!(!b.sent_origin(4_000));

        for _ in 0..RECENT_ORIGINS {
            b.compose(&player, t0, 5_000);
        }
        assert!(!b.sent_origin(first));
    }
}
