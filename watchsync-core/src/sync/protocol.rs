//! Sync Protocol Messages

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HubError;

/// Hub method the host invokes to relay its state
pub const SYNC_PLAYBACK: &str = "SyncPlayback";

/// Event name the hub delivers to every connected peer
pub const PLAYBACK_UPDATED: &str = "PlaybackUpdated";

/// Authoritative playback state as captured by the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    /// Whether the host is playing
    pub playing: bool,
    /// Position in seconds at `origin_ms`
    pub position_seconds: f64,
    /// Host wall-clock time (ms since UNIX epoch) when the position was read
    pub origin_ms: u64,
}

impl PlaybackState {
    /// Create a state, clamping negative or NaN positions to zero
    pub fn new(playing: bool, position_seconds: f64, origin_ms: u64) -> Self {
        let position_seconds = if position_seconds >= 0.0 {
            position_seconds
        } else {
            0.0
        };
        Self {
            playing,
            position_seconds,
            origin_ms,
        }
    }

    /// Milliseconds elapsed between `origin_ms` and `now_ms`
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.origin_ms)
    }

    /// Where the host is expected to be at `now_ms`.
    ///
    /// A paused state does not advance. A playing state advances by the
    /// elapsed wall-clock time, capped at `max_extrapolation` so a skewed
    /// clock cannot throw a follower far ahead.
    pub fn position_at(&self, now_ms: u64, max_extrapolation: Duration) -> f64 {
        if !self.playing {
            return self.position_seconds;
        }
        let cap = max_extrapolation.as_millis() as u64;
        let elapsed = self.elapsed_ms(now_ms).min(cap);
        self.position_seconds + elapsed as f64 / 1000.0
    }
}

/// `SyncPlayback` invocation sent by the host
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlayback {
    /// Identity of the sender (message attribution)
    pub identity: String,
    pub state: PlaybackState,
}

/// `PlaybackUpdated` event delivered by the hub
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUpdated {
    pub playing: bool,
    pub position_seconds: f64,
    /// Missing when the sender speaks the legacy two-argument form
    pub origin_ms: Option<u64>,
}

impl PlaybackUpdated {
    /// Build the event a hub relays for a given state
    pub fn from_state(state: &PlaybackState) -> Self {
        Self {
            playing: state.playing,
            position_seconds: state.position_seconds,
            origin_ms: Some(state.origin_ms),
        }
    }

    /// Resolve into a state, stamping legacy events with the receive time
    pub fn into_state(self, received_ms: u64) -> PlaybackState {
        PlaybackState::new(
            self.playing,
            self.position_seconds,
            self.origin_ms.unwrap_or(received_ms),
        )
    }
}

/// Positional frame for hubs that carry raw JSON messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubFrame {
    pub target: String,
    pub arguments: Vec<Value>,
}

impl HubFrame {
    pub fn to_json(&self) -> Result<String, HubError> {
        serde_json::to_string(self).map_err(|e| HubError::Codec(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, HubError> {
        serde_json::from_str(text).map_err(|e| HubError::Codec(e.to_string()))
    }

    fn expect_target(&self, target: &str) -> Result<(), HubError> {
        if self.target == target {
            Ok(())
        } else {
            Err(HubError::Codec(format!(
                "expected target {}, got {}",
                target, self.target
            )))
        }
    }

    fn bool_arg(&self, idx: usize) -> Result<bool, HubError> {
        self.arguments
            .get(idx)
            .and_then(Value::as_bool)
            .ok_or_else(|| HubError::Codec(format!("argument {} is not a bool", idx)))
    }

    fn f64_arg(&self, idx: usize) -> Result<f64, HubError> {
        self.arguments
            .get(idx)
            .and_then(Value::as_f64)
            .ok_or_else(|| HubError::Codec(format!("argument {} is not a number", idx)))
    }

    fn u64_arg(&self, idx: usize) -> Result<u64, HubError> {
        self.arguments
            .get(idx)
            .and_then(Value::as_u64)
            .ok_or_else(|| HubError::Codec(format!("argument {} is not a timestamp", idx)))
    }
}

impl SyncPlayback {
    pub fn to_frame(&self) -> HubFrame {
        HubFrame {
            target: SYNC_PLAYBACK.to_string(),
            arguments: vec![
                Value::from(self.identity.clone()),
                Value::from(self.state.playing),
                Value::from(self.state.position_seconds),
                Value::from(self.state.origin_ms),
            ],
        }
    }

    pub fn from_frame(frame: &HubFrame) -> Result<Self, HubError> {
        frame.expect_target(SYNC_PLAYBACK)?;
        let identity = frame
            .arguments
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| HubError::Codec("argument 0 is not an identity".to_string()))?
            .to_string();
        Ok(Self {
            identity,
            state: PlaybackState::new(frame.bool_arg(1)?, frame.f64_arg(2)?, frame.u64_arg(3)?),
        })
    }
}

impl PlaybackUpdated {
    pub fn to_frame(&self) -> HubFrame {
        let mut arguments = vec![
            Value::from(self.playing),
            Value::from(self.position_seconds),
        ];
        if let Some(origin_ms) = self.origin_ms {
            arguments.push(Value::from(origin_ms));
        }
        HubFrame {
            target: PLAYBACK_UPDATED.to_string(),
            arguments,
        }
    }

    pub fn from_frame(frame: &HubFrame) -> Result<Self, HubError> {
        frame.expect_target(PLAYBACK_UPDATED)?;
        let origin_ms = match frame.arguments.len() {
            2 => None,
            3 => Some(frame.u64_arg(2)?),
            n => return Err(HubError::Codec(format!("expected 2 or 3 arguments, got {}", n))),
        };
        Ok(Self {
            playing: frame.bool_arg(0)?,
            position_seconds: frame.f64_arg(1)?,
            origin_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_position_clamped() {
        assert_eq!(PlaybackState::new(true, -3.0, 0).position_seconds, 0.0);
        assert_eq!(PlaybackState::new(true, f64::NAN, 0).position_seconds, 0.0);
    }

    #[test]
    fn test_position_at_extrapolates_only_when_playing() {
        let cap = Duration::from_secs(5);
        let playing = PlaybackState::new(true, 10.0, 1_000);
        let paused = PlaybackState::new(false, 10.0, 1_000);

        assert_eq!(playing.position_at(3_000, cap), 12.0);
        assert_eq!(paused.position_at(3_000, cap), 10.0);
        // Clock behind origin never rewinds
        assert_eq!(playing.position_at(500, cap), 10.0);
        // Capped
        assert_eq!(playing.position_at(60_000, cap), 15.0);
    }

    #[test]
    fn test_legacy_event_without_origin() {
        let frame = HubFrame::from_json(r#"{"target":"PlaybackUpdated","arguments":[true,42.5]}"#)
            .unwrap();
        let event = PlaybackUpdated::from_frame(&frame).unwrap();
        assert_eq!(event.origin_ms, None);

        let state = event.into_state(9_000);
        assert_eq!(state.origin_ms, 9_000);
        assert_eq!(state.position_seconds, 42.5);
    }

    #[test]
    fn test_sync_playback_frame_layout() {
        let msg = SyncPlayback {
            identity: "suchit".to_string(),
            state: PlaybackState::new(false, 10.0, 77),
        };
        let json = msg.to_frame().to_json().unwrap();
        assert_eq!(
            json,
            r#"{"target":"SyncPlayback","arguments":["suchit",false,10.0,77]}"#
        );
    }

    #[test]
    fn test_rejects_wrong_target_and_arity() {
        let frame = HubFrame {
            target: "ReceiveMessage".to_string(),
            arguments: vec![],
        };
        assert!(matches!(
            PlaybackUpdated::from_frame(&frame),
            Err(HubError::Codec(_))
        ));

        let frame = HubFrame {
            target: PLAYBACK_UPDATED.to_string(),
            arguments: vec![Value::from(true)],
        };
        assert!(matches!(
            PlaybackUpdated::from_frame(&frame),
            Err(HubError::Codec(_))
        ));
    }
}
