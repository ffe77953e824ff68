//! Session implementation for FFI

use std::sync::{Arc, Once};

use parking_lot::RwLock;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::session::{SessionObserver, SyncSession};
use crate::sync::{HubFrame, PlaybackState, PlaybackUpdated, SyncPlayback};

use super::adapters::{
    deliver, CallbackObserver, Inbound, NativeHubConnector, NativePlayerAdapter,
};
use super::types::*;

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("watchsync_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_ansi(false) // Xcode / logcat consoles
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Main session interface, one per watch view.
///
/// No lock is held while native callbacks run, so callbacks may call back in.
#[derive(uniffi::Object)]
pub struct WatchSession {
    // Dropped before the runtime
    session: SyncSession,
    inbound: Inbound,
    callback: Arc<RwLock<Option<Arc<dyn SessionCallback>>>>,
    runtime: Runtime,
}

impl WatchSession {
    fn build(
        config: SessionConfig,
        player: Box<dyn NativePlayer>,
        hub: Box<dyn NativeHub>,
    ) -> Result<Self, CoreError> {
        init_tracing();
        config.validate()?;

        info!("Initializing watch session for {}", config.identity);

        let runtime = Runtime::new().map_err(|e| CoreError::RuntimeError(e.to_string()))?;
        let inbound: Inbound = Arc::new(RwLock::new(None));
        let callback = Arc::new(RwLock::new(None));

        let connector = Arc::new(NativeHubConnector {
            hub: Arc::from(hub),
            inbound: Arc::clone(&inbound),
        });
        let observer: Arc<dyn SessionObserver> = Arc::new(CallbackObserver {
            callback: Arc::clone(&callback),
        });
        let player = Arc::new(NativePlayerAdapter(Arc::from(player)));

        Ok(Self {
            session: SyncSession::with_observer(config, connector, player, Some(observer)),
            inbound,
            callback,
            runtime,
        })
    }
}

#[uniffi::export]
impl WatchSession {
    #[uniffi::constructor]
    pub fn new(
        config: WatchConfig,
        player: Box<dyn NativePlayer>,
        hub: Box<dyn NativeHub>,
    ) -> Result<Self, CoreError> {
        Self::build(config.into(), player, hub)
    }

    /// Create a session from a JSON config document
    #[uniffi::constructor]
    pub fn from_json(
        config_json: String,
        player: Box<dyn NativePlayer>,
        hub: Box<dyn NativeHub>,
    ) -> Result<Self, CoreError> {
        Self::build(SessionConfig::from_json(&config_json)?, player, hub)
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn SessionCallback>) {
        *self.callback.write() = Some(Arc::from(callback));
    }

    /// Connect to the hub and start syncing. Blocks until the handshake completes.
    pub fn mount(&self) -> Result<ViewerRole, CoreError> {
        let role = self.runtime.block_on(self.session.mount())?;
        Ok(role.into())
    }

    /// Tear down the session. Safe to call more than once.
    pub fn unmount(&self) {
        self.runtime.block_on(self.session.unmount());
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state().into()
    }

    pub fn role(&self) -> Option<ViewerRole> {
        self.session.role().map(ViewerRole::from)
    }

    /// Last host state applied locally
    pub fn host_playback(&self) -> Option<HostPlayback> {
        self.session.host_view().as_ref().map(HostPlayback::from)
    }

    pub fn play(&self) -> Result<(), CoreError> {
        Ok(self.session.play()?)
    }

    pub fn pause(&self) -> Result<(), CoreError> {
        Ok(self.session.pause()?)
    }

    pub fn toggle_playback(&self) -> Result<(), CoreError> {
        Ok(self.session.toggle_playback()?)
    }

    pub fn seek(&self, position_seconds: f64) -> Result<(), CoreError> {
        Ok(self.session.seek(position_seconds)?)
    }

    /// Forward a video element event (host only; ignored otherwise)
    pub fn player_event(&self, event: VideoEvent) {
        self.session.player_event(event.into());
    }

    /// Hand an inbound `PlaybackUpdated` event to the session.
    ///
    /// `origin_ms` is None for senders using the legacy two-argument form.
    pub fn deliver_playback_updated(
        &self,
        playing: bool,
        position_seconds: f64,
        origin_ms: Option<u64>,
    ) -> Result<(), CoreError> {
        deliver(
            &self.inbound,
            PlaybackUpdated {
                playing,
                position_seconds,
                origin_ms,
            },
        )
    }

    /// Hand a raw JSON hub frame (`{"target":"PlaybackUpdated","arguments":[...]}`) to the session
    pub fn deliver_frame(&self, frame_json: String) -> Result<(), CoreError> {
        let frame = HubFrame::from_json(&frame_json)?;
        let event = PlaybackUpdated::from_frame(&frame)?;
        deliver(&self.inbound, event)
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        // block_on panics inside a runtime; the driver is cancelled either way
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!("Watch session dropped inside a runtime without unmount");
            return;
        }
        self.runtime.block_on(self.session.unmount());
    }
}

/// Encode a `SyncPlayback` invocation as a JSON hub frame
#[uniffi::export]
pub fn encode_sync_playback(
    identity: String,
    playing: bool,
    position_seconds: f64,
    origin_ms: u64,
) -> Result<String, CoreError> {
    let call = SyncPlayback {
        identity,
        state: PlaybackState::new(playing, position_seconds, origin_ms),
    };
    Ok(call.to_frame().to_json()?)
}
