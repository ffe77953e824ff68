//! Error types for the sync core

use thiserror::Error;

/// Errors reported by a hub connection
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HubError {
    #[error("Hub handshake failed: {0}")]
    Handshake(String),

    #[error("Hub rejected the credential")]
    Unauthorized,

    #[error("Hub invoke failed: {0}")]
    Invoke(String),

    #[error("Hub connection closed")]
    Closed,

    #[error("Malformed hub frame: {0}")]
    Codec(String),
}

/// Errors reported by the local player
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlayerError {
    #[error("Media is not ready")]
    NotReady,

    #[error("Player rejected the request: {0}")]
    Rejected(String),
}

/// Non-fatal sync failures, surfaced to the observer and the log
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// Hub handshake or transport failure. The session stays out of sync.
    #[error("Connection error: {0}")]
    Connection(HubError),

    /// A `SyncPlayback` invoke was rejected. The next broadcast retries implicitly.
    #[error("Broadcast error: {0}")]
    Broadcast(HubError),

    /// The local player refused a correction. The next update retries it.
    #[error("Playback apply error: {0}")]
    PlaybackApply(PlayerError),
}

/// Errors returned by the session API
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("Not the host")]
    NotHost,

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is already mounted")]
    AlreadyMounted,

    #[error("Session was torn down; mount a new one")]
    Terminated,

    #[error("Connection error: {0}")]
    Connection(#[from] HubError),
}

/// Errors raised while loading a session configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
