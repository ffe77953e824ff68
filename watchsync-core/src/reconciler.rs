//! Follower reconciliation
//!
//! Applies host updates to the local player through the drift corrector.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::drift::{Correction, DriftCorrector};
use crate::error::PlayerError;
use crate::guard::FeedbackGuard;
use crate::player::Player;
use crate::sync::{HostView, PlaybackState, PlaybackUpdated};

/// What happened to one incoming update
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Dropped by the feedback guard
    Suppressed,
    /// Older than (or the same as) the last applied update
    Stale,
    /// Correction computed and applied (possibly `NoAction`)
    Applied(Correction),
    /// The player refused part of the correction
    Failed(Correction, PlayerError),
}

#[derive(Debug)]
pub struct FollowerReconciler {
    corrector: DriftCorrector,
    last_applied_origin: Option<u64>,
    host_view: Option<HostView>,
}

impl FollowerReconciler {
    pub fn new(corrector: DriftCorrector) -> Self {
        Self {
            corrector,
            last_applied_origin: None,
            host_view: None,
        }
    }

    /// Last known host state, for display
    pub fn host_view(&self) -> Option<&HostView> {
        self.host_view.as_ref()
    }

    /// Resolve an inbound event into a state.
    ///
    /// Events without an origin are ordered by arrival: they are stamped with
    /// the receive time, bumped past the last applied origin so a burst within
    /// one millisecond still counts as newer.
    pub fn resolve(&self, event: PlaybackUpdated, received_ms: u64) -> PlaybackState {
        if event.origin_ms.is_some() {
            return event.into_state(received_ms);
        }
        let stamp = self
            .last_applied_origin
            .map_or(received_ms, |last| received_ms.max(last + 1));
        event.into_state(stamp)
    }

    /// Raise the ordering floor to an origin this peer stamped itself.
    ///
    /// Echoes of our own broadcasts at or below it are then stale.
    pub fn note_origin(&mut self, origin_ms: u64) {
        let floor = self.last_applied_origin.map_or(origin_ms, |last| last.max(origin_ms));
        self.last_applied_origin = Some(floor);
    }

    /// Handle one `PlaybackUpdated` event
    pub fn handle(
        &mut self,
        observed: PlaybackState,
        player: &dyn Player,
        guard: &mut FeedbackGuard,
        now: Instant,
        now_ms: u64,
    ) -> Reconciled {
        if !guard.admit(now) {
            return Reconciled::Suppressed;
        }

        if let Some(last) = self.last_applied_origin {
            if observed.origin_ms <= last {
                debug!(
                    "Dropping stale update (origin {}ms, last applied {}ms)",
                    observed.origin_ms, last
                );
                return Reconciled::Stale;
            }
        }

        let local = player.snapshot();
        let correction = self.corrector.decide_at(&observed, &local, now_ms);

        debug!(
            "Update: host {:.3}s playing={} (elapsed {}ms), local {:.3}s playing={} -> {:?}",
            observed.position_seconds,
            observed.playing,
            observed.elapsed_ms(now_ms),
            local.position_seconds,
            local.playing,
            correction
        );

        let result = apply(correction, player);

        self.last_applied_origin = Some(observed.origin_ms);
        self.host_view = Some(HostView::new(observed));

        match result {
            Ok(()) => Reconciled::Applied(correction),
            Err(e) => {
                warn!("Could not apply {:?}: {}", correction, e);
                Reconciled::Failed(correction, e)
            }
        }
    }
}

/// Apply a correction: seek first, then play/pause.
///
/// A bare seek never changes the play state.
fn apply(correction: Correction, player: &dyn Player) -> Result<(), PlayerError> {
    if let Some(to) = correction.seek_target() {
        info!("Correcting drift: seeking to {:.3}s", to);
        player.seek(to)?;
    }
    match correction.play_state() {
        Some(true) => {
            info!("Host is playing, resuming");
            player.play()
        }
        Some(false) => {
            info!("Host is paused, pausing");
            player.pause()
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::clock::{Clock, ManualClock};
    use crate::player::{PlayerCall, SimulatedPlayer};

    fn setup() -> (Arc<ManualClock>, SimulatedPlayer, FollowerReconciler, FeedbackGuard) {
        let clock = ManualClock::new(1_000_000);
        let player = SimulatedPlayer::new(clock.clone());
        let reconciler = FollowerReconciler::new(
            DriftCorrector::default().with_extrapolation(Duration::from_secs(5)),
        );
        (clock, player, reconciler, FeedbackGuard::new(Duration::from_secs(1)))
    }

    #[test]
    fn test_follower_snaps_to_playing_host() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(40.0, false);

        let now_ms = clock.now_ms();
        let observed = PlaybackState::new(true, 42.0, now_ms);
        let outcome = reconciler.handle(observed, &player, &mut guard, Instant::now(), now_ms);

        assert_eq!(outcome, Reconciled::Applied(Correction::SeekAndPlay(42.0)));
        assert_eq!(player.calls(), vec![PlayerCall::Seek(42.0), PlayerCall::Play]);
        assert!(player.is_playing());
        assert!((player.current_position() - 42.0).abs() <= 0.5);
        assert_eq!(reconciler.host_view().map(|v| v.state), Some(observed));
    }

    #[test]
    fn test_host_pause_within_tolerance_only_pauses() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(10.3, true);

        let now_ms = clock.now_ms();
        let observed = PlaybackState::new(false, 10.0, now_ms);
        reconciler.handle(observed, &player, &mut guard, Instant::now(), now_ms);

        assert_eq!(player.calls(), vec![PlayerCall::Pause]);
    }

    #[test]
    fn test_host_pause_beyond_tolerance_snaps() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(12.0, true);

        let now_ms = clock.now_ms();
        let observed = PlaybackState::new(false, 10.0, now_ms);
        reconciler.handle(observed, &player, &mut guard, Instant::now(), now_ms);

        assert_eq!(player.calls(), vec![PlayerCall::Seek(10.0), PlayerCall::Pause]);
        assert_eq!(player.current_position(), 10.0);
    }

    #[test]
    fn test_reordered_update_never_moves_backward() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(50.0, false);

        let t2 = clock.now_ms();
        let newer = PlaybackState::new(false, 60.0, t2);
        let older = PlaybackState::new(false, 55.0, t2 - 500);

        reconciler.handle(newer, &player, &mut guard, Instant::now(), t2);
        assert_eq!(player.current_position(), 60.0);

        let outcome = reconciler.handle(older, &player, &mut guard, Instant::now(), t2);
        assert_eq!(outcome, Reconciled::Stale);
        assert_eq!(player.current_position(), 60.0);
        assert_eq!(reconciler.host_view().map(|v| v.state), Some(newer));
    }

    #[test]
    fn test_duplicate_update_dropped() {
        let (clock, player, mut reconciler, mut guard) = setup();
        let now_ms = clock.now_ms();
        let observed = PlaybackState::new(true, 5.0, now_ms);

        reconciler.handle(observed, &player, &mut guard, Instant::now(), now_ms);
        let outcome = reconciler.handle(observed, &player, &mut guard, Instant::now(), now_ms);
        assert_eq!(outcome, Reconciled::Stale);
    }

    #[test]
    fn test_suppressed_update_is_not_partially_applied() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(0.0, false);
        let now = Instant::now();
        guard.arm(now);

        let now_ms = clock.now_ms();
        let outcome = reconciler.handle(
            PlaybackState::new(true, 30.0, now_ms),
            &player,
            &mut guard,
            now,
            now_ms,
        );

        assert_eq!(outcome, Reconciled::Suppressed);
        assert!(player.calls().is_empty());
        assert!(reconciler.host_view().is_none());
    }

    #[test]
    fn test_unstamped_burst_ordered_by_arrival() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(0.0, false);
        let now_ms = clock.now_ms();

        for position in [10.0, 20.0] {
            let event = PlaybackUpdated {
                playing: false,
                position_seconds: position,
                origin_ms: None,
            };
            let observed = reconciler.resolve(event, now_ms);
            reconciler.handle(observed, &player, &mut guard, Instant::now(), now_ms);
        }

        assert_eq!(player.current_position(), 20.0);
        assert_eq!(player.calls(), vec![PlayerCall::Seek(10.0), PlayerCall::Seek(20.0)]);
    }

    #[test]
    fn test_stamped_event_keeps_its_origin() {
        let (_clock, _player, reconciler, _guard) = setup();
        let event = PlaybackUpdated {
            playing: true,
            position_seconds: 1.0,
            origin_ms: Some(7),
        };
        assert_eq!(reconciler.resolve(event, 1_000).origin_ms, 7);
    }

    #[test]
    fn test_own_origin_makes_older_echo_stale() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(10.0, false);
        let now_ms = clock.now_ms();

        // Heartbeat at now_ms, then a pause stamped just after it
        reconciler.note_origin(now_ms);
        reconciler.note_origin(now_ms + 1);
        reconciler.note_origin(now_ms);

        let late_echo = PlaybackState::new(true, 10.0, now_ms);
        let outcome = reconciler.handle(late_echo, &player, &mut guard, Instant::now(), now_ms);
        assert_eq!(outcome, Reconciled::Stale);
        assert!(player.calls().is_empty());
    }

    #[test]
    fn test_apply_failure_reported_and_retried() {
        let (clock, player, mut reconciler, mut guard) = setup();
        player.place(0.0, false);
        player.set_ready(false);

        let now_ms = clock.now_ms();
        let outcome = reconciler.handle(
            PlaybackState::new(true, 30.0, now_ms),
            &player,
            &mut guard,
            Instant::now(),
            now_ms,
        );
        assert_eq!(
            outcome,
            Reconciled::Failed(Correction::SeekAndPlay(30.0), PlayerError::NotReady)
        );
        // Host view still tracks the host
        assert!(reconciler.host_view().is_some());

        // Next update retries
        player.set_ready(true);
        clock.advance_ms(1000);
        let now_ms = clock.now_ms();
        let outcome = reconciler.handle(
            PlaybackState::new(true, 31.0, now_ms),
            &player,
            &mut guard,
            Instant::now(),
            now_ms,
        );
        assert_eq!(outcome, Reconciled::Applied(Correction::SeekAndPlay(31.0)));
    }
}
