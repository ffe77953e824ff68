//! Watch Together - Core Library
//!
//! This library keeps video playback in lock-step across viewers: one host
//! owns the playback truth and every follower mirrors it through a shared
//! message hub.

pub mod broadcaster;
pub mod clock;
pub mod config;
pub mod drift;
pub mod error;
pub mod ffi;
pub mod guard;
pub mod hub;
pub mod player;
pub mod reconciler;
pub mod session;
pub mod sync;

// Re-exports for convenience
pub use config::{EchoPolicy, SessionConfig};
pub use drift::{Correction, DriftCorrector};
pub use error::{SessionError, SyncError};
pub use hub::{HubConnection, HubConnector, LocalHub};
pub use player::{Player, PlayerEvent};
pub use session::{SessionObserver, SyncSession};
pub use sync::{PlaybackState, Role, SessionState};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
