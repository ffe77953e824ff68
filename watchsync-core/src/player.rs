//! Local player surface
//!
//! The sync core drives a video element through this trait and listens to
//! its element events through [`PlayerEvent`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::drift::LocalPlayback;
use crate::error::PlayerError;

/// A local video player
pub trait Player: Send + Sync {
    /// Current position in seconds
    fn current_position(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn seek(&self, to: f64) -> Result<(), PlayerError>;
    fn play(&self) -> Result<(), PlayerError>;
    fn pause(&self) -> Result<(), PlayerError>;

    /// Read position and play state together
    fn snapshot(&self) -> LocalPlayback {
        LocalPlayback {
            playing: self.is_playing(),
            position_seconds: self.current_position(),
        }
    }
}

/// Events raised by the video element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    /// Playback started from the element's own controls
    Played,
    /// Playback paused from the element's own controls
    Paused,
    /// Scrubbing in progress (fires continuously while dragging)
    Seeking(f64),
    /// Seek finished
    Seeked(f64),
    /// Periodic position notification
    TimeUpdate(f64),
}

/// A call the sync core made on a player
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerCall {
    Seek(f64),
    Play,
    Pause,
}

struct SimState {
    playing: bool,
    /// Position at `anchor_ms`
    anchor_position: f64,
    anchor_ms: u64,
    ready: bool,
    calls: Vec<PlayerCall>,
}

/// A player whose position advances with a [`Clock`].
///
/// Records every call so tests and the simulator can inspect what the sync
/// core did. `rate` lets a simulation model a player that runs fast or slow.
pub struct SimulatedPlayer {
    clock: Arc<dyn Clock>,
    rate: f64,
    state: Mutex<SimState>,
}

impl SimulatedPlayer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_rate(clock, 1.0)
    }

    pub fn with_rate(clock: Arc<dyn Clock>, rate: f64) -> Self {
        let anchor_ms = clock.now_ms();
        Self {
            clock,
            rate,
            state: Mutex::new(SimState {
                playing: false,
                anchor_position: 0.0,
                anchor_ms,
                ready: true,
                calls: Vec::new(),
            }),
        }
    }

    /// Put the player at a position and play state without recording a call
    pub fn place(&self, position: f64, playing: bool) {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.anchor_position = position;
        state.anchor_ms = now;
        state.playing = playing;
    }

    /// Simulate media that is not ready to seek or play
    pub fn set_ready(&self, ready: bool) {
        self.state.lock().ready = ready;
    }

    pub fn calls(&self) -> Vec<PlayerCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn position_locked(&self, state: &SimState) -> f64 {
        if state.playing {
            let elapsed = self.clock.now_ms().saturating_sub(state.anchor_ms) as f64 / 1000.0;
            state.anchor_position + elapsed * self.rate
        } else {
            state.anchor_position
        }
    }

    fn rebase(&self, state: &mut SimState) {
        state.anchor_position = self.position_locked(state);
        state.anchor_ms = self.clock.now_ms();
    }
}

impl Player for SimulatedPlayer {
    fn current_position(&self) -> f64 {
        let state = self.state.lock();
        self.position_locked(&state)
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn seek(&self, to: f64) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(PlayerError::NotReady);
        }
        state.calls.push(PlayerCall::Seek(to));
        state.anchor_position = to.max(0.0);
        state.anchor_ms = self.clock.now_ms();
        Ok(())
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if !state.ready {
            return Err(PlayerError::NotReady);
        }
        state.calls.push(PlayerCall::Play);
        self.rebase(&mut state);
        state.playing = true;
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.calls.push(PlayerCall::Pause);
        self.rebase(&mut state);
        state.playing = false;
        Ok(())
    }
}
