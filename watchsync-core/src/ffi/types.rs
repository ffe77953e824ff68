//! FFI types exposed via uniffi

use crate::config::{Credential, EchoPolicy, SessionConfig};
use crate::error::{ConfigError, HubError, PlayerError, SessionError};
use crate::player::PlayerEvent;
use crate::sync::{HostView, Role, SessionState};

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Session is not connected")]
    NotConnected,

    #[error("Not the host")]
    NotHost,

    #[error("Session is already mounted")]
    AlreadyMounted,

    #[error("Session was torn down")]
    Terminated,

    #[error("Hub rejected the credential")]
    Unauthorized,

    #[error("Hub error: {0}")]
    HubError(String),

    #[error("Media is not ready")]
    MediaNotReady,

    #[error("Player rejected the request: {0}")]
    PlayerRejected(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Callback failed: {0}")]
    CallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for CoreError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        CoreError::CallbackError(e.reason)
    }
}

impl From<HubError> for CoreError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::Unauthorized => CoreError::Unauthorized,
            HubError::Closed => CoreError::NotConnected,
            other => CoreError::HubError(other.to_string()),
        }
    }
}

impl From<PlayerError> for CoreError {
    fn from(e: PlayerError) -> Self {
        match e {
            PlayerError::NotReady => CoreError::MediaNotReady,
            PlayerError::Rejected(msg) => CoreError::PlayerRejected(msg),
        }
    }
}

impl From<SessionError> for CoreError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotHost => CoreError::NotHost,
            SessionError::NotConnected => CoreError::NotConnected,
            SessionError::AlreadyMounted => CoreError::AlreadyMounted,
            SessionError::Terminated => CoreError::Terminated,
            SessionError::Connection(e) => e.into(),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::InvalidConfig(e.to_string())
    }
}

/// Session configuration exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct WatchConfig {
    pub identity: String,
    pub host_identity: String,
    pub access_token: String,
    pub tolerance_seconds: f64,
    pub heartbeat_interval_ms: u64,
    pub seek_debounce_ms: u64,
    pub feedback_window_ms: u64,
    pub extrapolate: bool,
    pub max_extrapolation_ms: u64,
    /// Whether the hub echoes the host's own broadcasts; None to ask the hub
    pub hub_echo: Option<bool>,
}

impl From<WatchConfig> for SessionConfig {
    fn from(c: WatchConfig) -> Self {
        let echo = match c.hub_echo {
            None => EchoPolicy::Auto,
            Some(true) => EchoPolicy::Echoes,
            Some(false) => EchoPolicy::NoEcho,
        };
        Self {
            identity: c.identity,
            host_identity: c.host_identity,
            credential: Credential::new(c.access_token),
            tolerance_seconds: c.tolerance_seconds,
            heartbeat_interval_ms: c.heartbeat_interval_ms,
            seek_debounce_ms: c.seek_debounce_ms,
            feedback_window_ms: c.feedback_window_ms,
            extrapolate: c.extrapolate,
            max_extrapolation_ms: c.max_extrapolation_ms,
            echo,
        }
    }
}

/// Build a config with default timings
#[uniffi::export]
pub fn default_watch_config(
    identity: String,
    host_identity: String,
    access_token: String,
) -> WatchConfig {
    let defaults = SessionConfig::default();
    WatchConfig {
        identity,
        host_identity,
        access_token,
        tolerance_seconds: defaults.tolerance_seconds,
        heartbeat_interval_ms: defaults.heartbeat_interval_ms,
        seek_debounce_ms: defaults.seek_debounce_ms,
        feedback_window_ms: defaults.feedback_window_ms,
        extrapolate: defaults.extrapolate,
        max_extrapolation_ms: defaults.max_extrapolation_ms,
        hub_echo: None,
    }
}

/// Connection state exposed via FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl From<SessionState> for ConnectionState {
    fn from(s: SessionState) -> Self {
        match s {
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Connecting => ConnectionState::Connecting,
            SessionState::Connected => ConnectionState::Connected,
            SessionState::Closed => ConnectionState::Closed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum ViewerRole {
    Host,
    Follower,
}

impl From<Role> for ViewerRole {
    fn from(r: Role) -> Self {
        match r {
            Role::Host => ViewerRole::Host,
            Role::Follower => ViewerRole::Follower,
        }
    }
}

/// Video element events forwarded by the native player
#[derive(Debug, Clone, Copy, PartialEq, uniffi::Enum)]
pub enum VideoEvent {
    Played,
    Paused,
    Seeking { position_seconds: f64 },
    Seeked { position_seconds: f64 },
    TimeUpdate { position_seconds: f64 },
}

impl From<VideoEvent> for PlayerEvent {
    fn from(e: VideoEvent) -> Self {
        match e {
            VideoEvent::Played => PlayerEvent::Played,
            VideoEvent::Paused => PlayerEvent::Paused,
            VideoEvent::Seeking { position_seconds } => PlayerEvent::Seeking(position_seconds),
            VideoEvent::Seeked { position_seconds } => PlayerEvent::Seeked(position_seconds),
            VideoEvent::TimeUpdate { position_seconds } => {
                PlayerEvent::TimeUpdate(position_seconds)
            }
        }
    }
}

/// Last host state applied locally, for the host state panel
#[derive(Debug, Clone, uniffi::Record)]
pub struct HostPlayback {
    pub is_playing: bool,
    pub position_seconds: f64,
    pub origin_ms: u64,
    /// "Playing" or "Paused"
    pub label: String,
}

impl From<&HostView> for HostPlayback {
    fn from(v: &HostView) -> Self {
        Self {
            is_playing: v.state.playing,
            position_seconds: v.state.position_seconds,
            origin_ms: v.state.origin_ms,
            label: v.playback_label().to_string(),
        }
    }
}

/// The native video element
#[uniffi::export(callback_interface)]
pub trait NativePlayer: Send + Sync {
    fn current_position(&self) -> f64;
    fn is_playing(&self) -> bool;
    fn seek(&self, to: f64) -> Result<(), CoreError>;
    fn play(&self) -> Result<(), CoreError>;
    fn pause(&self) -> Result<(), CoreError>;
}

/// The native hub client.
///
/// Inbound `PlaybackUpdated` events are handed back through
/// `WatchSession::deliver_playback_updated` (or `deliver_frame` for raw JSON).
#[uniffi::export(callback_interface)]
pub trait NativeHub: Send + Sync {
    /// Open the connection with a bearer token. Blocking is fine.
    fn connect(&self, access_token: String) -> Result<(), CoreError>;
    fn invoke_sync_playback(
        &self,
        identity: String,
        playing: bool,
        position_seconds: f64,
        origin_ms: u64,
    ) -> Result<(), CoreError>;
    fn stop(&self) -> Result<(), CoreError>;
    /// Whether the hub delivers the sender's own broadcasts back to it, if known
    fn echoes_own_messages(&self) -> Option<bool>;
}

/// Callback interface for session events
#[uniffi::export(callback_interface)]
pub trait SessionCallback: Send + Sync {
    fn on_state_changed(&self, state: ConnectionState);
    fn on_host_playback(&self, playback: HostPlayback);
    fn on_error(&self, message: String);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::PlaybackState;

    #[test]
    fn test_watch_config_echo_mapping() {
        let mut c = default_watch_config("a".into(), "b".into(), "t".into());
        assert_eq!(SessionConfig::from(c.clone()).echo, EchoPolicy::Auto);
        c.hub_echo = Some(false);
        let config = SessionConfig::from(c);
        assert_eq!(config.echo, EchoPolicy::NoEcho);
        assert_eq!(config.credential.as_str(), "t");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_error_mapping() {
        assert!(matches!(
            CoreError::from(SessionError::Connection(HubError::Unauthorized)),
            CoreError::Unauthorized
        ));
        assert!(matches!(
            CoreError::from(PlayerError::NotReady),
            CoreError::MediaNotReady
        ));
        assert!(matches!(
            CoreError::from(SessionError::NotHost),
            CoreError::NotHost
        ));
    }

    #[test]
    fn test_host_playback_label() {
        let view = HostView::new(PlaybackState::new(false, 3.5, 10));
        let playback = HostPlayback::from(&view);
        assert_eq!(playback.label, "Paused");
        assert_eq!(playback.position_seconds, 3.5);
    }
}
