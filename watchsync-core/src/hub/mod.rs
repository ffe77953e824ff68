//! Message hub capability
//!
//! The real-time hub is an external collaborator. The session only sees it
//! through these traits: an outbound `invoke` and an inbound subscription
//! channel, both owned by the session for its lifetime.

mod memory;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::config::Credential;
use crate::error::HubError;
use crate::sync::{PlaybackUpdated, SyncPlayback};

pub use memory::{LocalConnection, LocalHub};

/// Future returned by hub operations
pub type HubFuture<T> = BoxFuture<'static, Result<T, HubError>>;

/// Opens hub connections
pub trait HubConnector: Send + Sync {
    /// Perform the handshake with a bearer credential
    fn connect(&self, credential: &Credential) -> HubFuture<Box<dyn HubConnection>>;
}

/// One open hub connection
pub trait HubConnection: Send + Sync {
    /// Register the `PlaybackUpdated` handler. Dropping the subscription unregisters it.
    fn subscribe_playback(&self) -> Result<Subscription, HubError>;

    /// Invoke `SyncPlayback`. The returned future is independent of `self`.
    fn invoke(&self, call: SyncPlayback) -> HubFuture<()>;

    /// Close the connection
    fn stop(&self) -> HubFuture<()>;

    /// Whether this hub delivers a sender's own broadcasts back to it, if known
    fn echoes_own_messages(&self) -> Option<bool> {
        None
    }
}

/// Receiving end of a `PlaybackUpdated` registration
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<PlaybackUpdated>,
}

/// Sending end used by hub implementations to deliver events
pub type SubscriptionSender = mpsc::UnboundedSender<PlaybackUpdated>;

impl Subscription {
    pub fn channel() -> (SubscriptionSender, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Subscription { rx })
    }

    /// Next event, or `None` once the hub dropped the registration
    pub async fn recv(&mut self) -> Option<PlaybackUpdated> {
        self.rx.recv().await
    }
}
