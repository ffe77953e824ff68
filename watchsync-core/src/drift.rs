//! Drift correction
//!
//! Decides whether a local player must be corrected to match the host. The
//! seek decision and the play/pause decision are independent and composed.

use std::time::Duration;

use crate::config::DEFAULT_TOLERANCE_SECONDS;
use crate::sync::PlaybackState;

/// What the local player is doing right now
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalPlayback {
    pub playing: bool,
    pub position_seconds: f64,
}

/// Correction to apply to a local player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    NoAction,
    Seek(f64),
    Play,
    Pause,
    SeekAndPlay(f64),
    SeekAndPause(f64),
}

impl Correction {
    /// Compose an optional seek target with an optional play state
    pub fn compose(seek: Option<f64>, play: Option<bool>) -> Self {
        match (seek, play) {
            (None, None) => Correction::NoAction,
            (Some(to), None) => Correction::Seek(to),
            (None, Some(true)) => Correction::Play,
            (None, Some(false)) => Correction::Pause,
            (Some(to), Some(true)) => Correction::SeekAndPlay(to),
            (Some(to), Some(false)) => Correction::SeekAndPause(to),
        }
    }

    pub fn seek_target(&self) -> Option<f64> {
        match *self {
            Correction::Seek(to) | Correction::SeekAndPlay(to) | Correction::SeekAndPause(to) => {
                Some(to)
            }
            _ => None,
        }
    }

    /// `Some(true)` to play, `Some(false)` to pause, `None` to leave alone
    pub fn play_state(&self) -> Option<bool> {
        match self {
            Correction::Play | Correction::SeekAndPlay(_) => Some(true),
            Correction::Pause | Correction::SeekAndPause(_) => Some(false),
            _ => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Correction::NoAction)
    }
}

/// Compares an observed host state against the local player
#[derive(Debug, Clone, Copy)]
pub struct DriftCorrector {
    tolerance_seconds: f64,
    /// `None` disables latency extrapolation
    max_extrapolation: Option<Duration>,
}

impl DriftCorrector {
    pub fn new(tolerance_seconds: f64) -> Self {
        Self {
            tolerance_seconds,
            max_extrapolation: None,
        }
    }

    /// Extrapolate playing states by elapsed time, up to `cap`
    pub fn with_extrapolation(mut self, cap: Duration) -> Self {
        self.max_extrapolation = Some(cap);
        self
    }

    pub fn tolerance_seconds(&self) -> f64 {
        self.tolerance_seconds
    }

    /// Host position this corrector would steer towards at `now_ms`
    pub fn target_position(&self, observed: &PlaybackState, now_ms: u64) -> f64 {
        match self.max_extrapolation {
            Some(cap) => observed.position_at(now_ms, cap),
            None => observed.position_seconds,
        }
    }

    /// Decide using the observed position verbatim
    pub fn decide(&self, observed: &PlaybackState, local: &LocalPlayback) -> Correction {
        self.correct(observed.position_seconds, observed.playing, local)
    }

    /// Decide against where the host is expected to be at `now_ms`
    pub fn decide_at(
        &self,
        observed: &PlaybackState,
        local: &LocalPlayback,
        now_ms: u64,
    ) -> Correction {
        self.correct(self.target_position(observed, now_ms), observed.playing, local)
    }

    fn correct(&self, target: f64, playing: bool, local: &LocalPlayback) -> Correction {
        let delta = (local.position_seconds - target).abs();
        let seek = (delta > self.tolerance_seconds).then_some(target);
        let play = (playing != local.playing).then_some(playing);
        Correction::compose(seek, play)
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn local(playing: bool, position_seconds: f64) -> LocalPlayback {
        LocalPlayback {
            playing,
            position_seconds,
        }
    }

    #[test]
    fn test_within_tolerance_is_noop() {
        let corrector = DriftCorrector::default();
        let mut rng = rand::thread_rng();

        for _ in 0..1000 {
            let playing = rng.gen_bool(0.5);
            let position = rng.gen_range(0.0..10_000.0);
            let drift = rng.gen_range(-0.49..=0.49);
            let observed = PlaybackState::new(playing, position, 0);

            let decision = corrector.decide(&observed, &local(playing, position + drift));
            assert_eq!(decision, Correction::NoAction, "drift {} at {}", drift, position);
        }
    }

    #[test]
    fn test_ahead_seeks_back_without_touching_play_state() {
        let corrector = DriftCorrector::default();
        let observed = PlaybackState::new(true, 100.0, 0);

        let decision = corrector.decide(&observed, &local(true, 101.2));
        assert_eq!(decision, Correction::Seek(100.0));
        assert_eq!(decision.play_state(), None);
    }

    #[test]
    fn test_play_state_mismatch_only() {
        let corrector = DriftCorrector::default();
        let observed = PlaybackState::new(true, 30.0, 0);

        assert_eq!(corrector.decide(&observed, &local(false, 30.0)), Correction::Play);

        let observed = PlaybackState::new(false, 30.0, 0);
        assert_eq!(corrector.decide(&observed, &local(true, 30.2)), Correction::Pause);
    }

    #[test]
    fn test_seek_and_play_composed() {
        let corrector = DriftCorrector::default();
        let observed = PlaybackState::new(true, 42.0, 0);

        let decision = corrector.decide(&observed, &local(false, 40.0));
        assert_eq!(decision, Correction::SeekAndPlay(42.0));
        assert_eq!(decision.seek_target(), Some(42.0));
        assert_eq!(decision.play_state(), Some(true));
    }

    #[test]
    fn test_extrapolates_elapsed_time() {
        let corrector = DriftCorrector::default().with_extrapolation(Duration::from_secs(5));
        let observed = PlaybackState::new(true, 10.0, 1_000);

        // Host stamped 2s ago; we're at 12.1 which is in sync
        assert_eq!(
            corrector.decide_at(&observed, &local(true, 12.1), 3_000),
            Correction::NoAction
        );
        // Verbatim comparison would have seeked us back
        assert_eq!(
            corrector.decide(&observed, &local(true, 12.1)),
            Correction::Seek(10.0)
        );
        // Behind the extrapolated position
        assert_eq!(
            corrector.decide_at(&observed, &local(true, 10.0), 3_000),
            Correction::Seek(12.0)
        );
    }

    #[test]
    fn test_paused_host_not_extrapolated() {
        let corrector = DriftCorrector::default().with_extrapolation(Duration::from_secs(5));
        let observed = PlaybackState::new(false, 10.0, 1_000);

        assert_eq!(
            corrector.decide_at(&observed, &local(false, 10.3), 4_000),
            Correction::NoAction
        );
    }

    #[test]
    fn test_compose_table() {
        assert_eq!(Correction::compose(None, None), Correction::NoAction);
        assert_eq!(Correction::compose(Some(1.0), Some(false)), Correction::SeekAndPause(1.0));
        assert!(Correction::NoAction.is_noop());
        assert!(!Correction::Pause.is_noop());
    }
}
