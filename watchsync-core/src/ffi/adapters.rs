//! Bridges from the foreign callback interfaces to the core traits

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::types::{
    ConnectionState, CoreError, HostPlayback, NativeHub, NativePlayer, SessionCallback,
};
use crate::config::Credential;
use crate::error::{HubError, PlayerError, SyncError};
use crate::hub::{HubConnection, HubConnector, HubFuture, Subscription, SubscriptionSender};
use crate::player::Player;
use crate::session::SessionObserver;
use crate::sync::{HostView, PlaybackUpdated, SessionState, SyncPlayback};

/// Sender for the currently registered `PlaybackUpdated` handler
pub(crate) type Inbound = Arc<RwLock<Option<SubscriptionSender>>>;

pub(crate) struct NativePlayerAdapter(pub Arc<dyn NativePlayer>);

fn player_error(e: CoreError) -> PlayerError {
    match e {
        CoreError::MediaNotReady => PlayerError::NotReady,
        other => PlayerError::Rejected(other.to_string()),
    }
}

impl Player for NativePlayerAdapter {
    fn current_position(&self) -> f64 {
        self.0.current_position()
    }

    fn is_playing(&self) -> bool {
        self.0.is_playing()
    }

    fn seek(&self, to: f64) -> Result<(), PlayerError> {
        self.0.seek(to).map_err(player_error)
    }

    fn play(&self) -> Result<(), PlayerError> {
        self.0.play().map_err(player_error)
    }

    fn pause(&self) -> Result<(), PlayerError> {
        self.0.pause().map_err(player_error)
    }
}

/// Foreign hub calls may block, so they run on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, HubError>
where
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result.map_err(|e| match e {
            CoreError::Unauthorized => HubError::Unauthorized,
            CoreError::NotConnected => HubError::Closed,
            other => HubError::Invoke(other.to_string()),
        }),
        Err(e) => Err(HubError::Invoke(e.to_string())),
    }
}

pub(crate) struct NativeHubConnector {
    pub hub: Arc<dyn NativeHub>,
    pub inbound: Inbound,
}

impl HubConnector for NativeHubConnector {
    fn connect(&self, credential: &Credential) -> HubFuture<Box<dyn HubConnection>> {
        let hub = Arc::clone(&self.hub);
        let inbound = Arc::clone(&self.inbound);
        let token = credential.as_str().to_string();

        Box::pin(async move {
            let connecting = Arc::clone(&hub);
            blocking(move || connecting.connect(token))
                .await
                .map_err(|e| match e {
                    HubError::Invoke(msg) => HubError::Handshake(msg),
                    other => other,
                })?;
            Ok::<Box<dyn HubConnection>, HubError>(Box::new(NativeConnection { hub, inbound }))
        })
    }
}

struct NativeConnection {
    hub: Arc<dyn NativeHub>,
    inbound: Inbound,
}

impl HubConnection for NativeConnection {
    fn subscribe_playback(&self) -> Result<Subscription, HubError> {
        let (tx, subscription) = Subscription::channel();
        *self.inbound.write() = Some(tx);
        Ok(subscription)
    }

    fn invoke(&self, call: SyncPlayback) -> HubFuture<()> {
        let hub = Arc::clone(&self.hub);
        Box::pin(async move {
            blocking(move || {
                hub.invoke_sync_playback(
                    call.identity,
                    call.state.playing,
                    call.state.position_seconds,
                    call.state.origin_ms,
                )
            })
            .await
        })
    }

    fn stop(&self) -> HubFuture<()> {
        // Unregister first so late deliveries are refused
        self.inbound.write().take();
        let hub = Arc::clone(&self.hub);
        Box::pin(async move { blocking(move || hub.stop()).await })
    }

    fn echoes_own_messages(&self) -> Option<bool> {
        self.hub.echoes_own_messages()
    }
}

/// Hand an inbound event to the registered handler
pub(crate) fn deliver(inbound: &Inbound, event: PlaybackUpdated) -> Result<(), CoreError> {
    match inbound.read().as_ref() {
        Some(tx) => tx.send(event).map_err(|_| CoreError::NotConnected),
        None => {
            debug!("No playback handler registered, dropping {:?}", event);
            Err(CoreError::NotConnected)
        }
    }
}

/// Forwards session notifications to the callback set by the native side
pub(crate) struct CallbackObserver {
    pub callback: Arc<RwLock<Option<Arc<dyn SessionCallback>>>>,
}

impl CallbackObserver {
    fn with_callback(&self, f: impl FnOnce(&dyn SessionCallback)) {
        // Clone out so the callback may replace itself
        let callback = self.callback.read().clone();
        if let Some(cb) = callback {
            f(cb.as_ref());
        }
    }
}

impl SessionObserver for CallbackObserver {
    fn on_state_changed(&self, state: SessionState) {
        self.with_callback(|cb| cb.on_state_changed(ConnectionState::from(state)));
    }

    fn on_host_state(&self, view: HostView) {
        self.with_callback(|cb| cb.on_host_playback(HostPlayback::from(&view)));
    }

    fn on_error(&self, error: SyncError) {
        self.with_callback(|cb| cb.on_error(error.to_string()));
    }
}
