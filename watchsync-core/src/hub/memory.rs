//! In-process hub
//!
//! Relays `SyncPlayback` invocations to every connected subscriber, with an
//! optional delivery latency and jitter. Used by tests and the simulator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tracing::{debug, info};

use super::{HubConnection, HubConnector, HubFuture, Subscription, SubscriptionSender};
use crate::config::Credential;
use crate::error::HubError;
use crate::sync::{PlaybackUpdated, SyncPlayback};

struct HubInner {
    echo: bool,
    latency: Duration,
    jitter: Duration,
    required_credential: RwLock<Option<Credential>>,
    fail_invokes: AtomicBool,
    fail_subscribe: AtomicBool,
    next_peer_id: AtomicU64,
    /// Subscribers per connected peer
    peers: RwLock<HashMap<u64, Vec<SubscriptionSender>>>,
    invocations: RwLock<Vec<SyncPlayback>>,
}

impl HubInner {
    fn delivery_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.latency;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.latency + Duration::from_millis(jitter_ms)
    }

    fn deliver(&self, from: Option<u64>, event: PlaybackUpdated) {
        let peers = self.peers.read();
        for (peer_id, subscribers) in peers.iter() {
            if !self.echo && Some(*peer_id) == from {
                continue;
            }
            for tx in subscribers {
                let _ = tx.send(event);
            }
        }
    }
}

/// A hub that lives in this process
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    /// Create a hub. `echo` controls whether senders receive their own broadcasts.
    pub fn new(echo: bool) -> Self {
        Self::with_latency(echo, Duration::ZERO, Duration::ZERO)
    }

    /// Create a hub that delays each delivery by `latency` plus up to `jitter`.
    ///
    /// Independent per-delivery jitter reorders messages, like a real network.
    pub fn with_latency(echo: bool, latency: Duration, jitter: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                echo,
                latency,
                jitter,
                required_credential: RwLock::new(None),
                fail_invokes: AtomicBool::new(false),
                fail_subscribe: AtomicBool::new(false),
                next_peer_id: AtomicU64::new(1),
                peers: RwLock::new(HashMap::new()),
                invocations: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Reject handshakes that do not present this credential
    pub fn require_credential(&self, credential: Credential) {
        *self.inner.required_credential.write() = Some(credential);
    }

    /// Make every invoke fail
    pub fn set_fail_invokes(&self, fail: bool) {
        self.inner.fail_invokes.store(fail, Ordering::SeqCst);
    }

    /// Make subscription registration fail after a successful handshake
    pub fn set_fail_subscribe(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Every successful `SyncPlayback` invocation so far
    pub fn invocations(&self) -> Vec<SyncPlayback> {
        self.inner.invocations.read().clone()
    }

    pub fn connected_peers(&self) -> usize {
        self.inner.peers.read().len()
    }

    /// Deliver an event to every subscriber, as if relayed from elsewhere
    pub fn publish(&self, event: PlaybackUpdated) {
        self.inner.deliver(None, event);
    }

    /// Drop every registration, simulating a transport failure
    pub fn disconnect_all(&self) {
        let mut peers = self.inner.peers.write();
        for subscribers in peers.values_mut() {
            subscribers.clear();
        }
        info!("Local hub: dropped all subscriptions");
    }
}

impl HubConnector for LocalHub {
    fn connect(&self, credential: &Credential) -> HubFuture<Box<dyn HubConnection>> {
        let inner = Arc::clone(&self.inner);
        let credential = credential.clone();

        Box::pin(async move {
            if let Some(required) = inner.required_credential.read().as_ref() {
                if *required != credential {
                    return Err(HubError::Unauthorized);
                }
            }

            let peer_id = inner.next_peer_id.fetch_add(1, Ordering::SeqCst);
            inner.peers.write().insert(peer_id, Vec::new());
            debug!("Local hub: peer {} connected", peer_id);

            Ok(Box::new(LocalConnection { inner, peer_id }) as Box<dyn HubConnection>)
        })
    }
}

/// A connection to a [`LocalHub`]
pub struct LocalConnection {
    inner: Arc<HubInner>,
    peer_id: u64,
}

impl HubConnection for LocalConnection {
    fn subscribe_playback(&self) -> Result<Subscription, HubError> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(HubError::Handshake("subscription refused".to_string()));
        }
        let mut peers = self.inner.peers.write();
        let subscribers = peers.get_mut(&self.peer_id).ok_or(HubError::Closed)?;
        let (tx, subscription) = Subscription::channel();
        subscribers.push(tx);
        Ok(subscription)
    }

    fn invoke(&self, call: SyncPlayback) -> HubFuture<()> {
        let inner = Arc::clone(&self.inner);
        let from = self.peer_id;

        Box::pin(async move {
            if !inner.peers.read().contains_key(&from) {
                return Err(HubError::Closed);
            }
            if inner.fail_invokes.load(Ordering::SeqCst) {
                return Err(HubError::Invoke("hub unavailable".to_string()));
            }

            let event = PlaybackUpdated::from_state(&call.state);
            inner.invocations.write().push(call);

            let delay = inner.delivery_delay();
            if delay.is_zero() {
                inner.deliver(Some(from), event);
            } else {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.deliver(Some(from), event);
                });
            }
            Ok(())
        })
    }

    fn stop(&self) -> HubFuture<()> {
        let inner = Arc::clone(&self.inner);
        let peer_id = self.peer_id;

        Box::pin(async move {
            if inner.peers.write().remove(&peer_id).is_some() {
                debug!("Local hub: peer {} disconnected", peer_id);
            }
            Ok(())
        })
    }

    fn echoes_own_messages(&self) -> Option<bool> {
        Some(self.inner.echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::PlaybackState;

    fn call(position: f64, origin_ms: u64) -> SyncPlayback {
        SyncPlayback {
            identity: "host".to_string(),
            state: PlaybackState::new(true, position, origin_ms),
        }
    }

    #[tokio::test]
    async fn test_echo_hub_delivers_to_sender() {
        let hub = LocalHub::new(true);
        let conn = hub.connect(&Credential::default()).await.unwrap();
        let mut sub = conn.subscribe_playback().unwrap();

        conn.invoke(call(1.0, 10)).await.unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(event.origin_ms, Some(10));
    }

    #[tokio::test]
    async fn test_no_echo_hub_skips_sender() {
        let hub = LocalHub::new(false);
        let host = hub.connect(&Credential::default()).await.unwrap();
        let peer = hub.connect(&Credential::default()).await.unwrap();
        let mut host_sub = host.subscribe_playback().unwrap();
        let mut peer_sub = peer.subscribe_playback().unwrap();

        host.invoke(call(1.0, 10)).await.unwrap();
        assert!(peer_sub.recv().await.is_some());
        assert!(host_sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_credential_checked() {
        let hub = LocalHub::new(true);
        hub.require_credential(Credential::new("good"));

        assert!(matches!(
            hub.connect(&Credential::new("bad")).await,
            Err(HubError::Unauthorized)
        ));
        assert!(hub.connect(&Credential::new("good")).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_releases_peer_and_rejects_invoke() {
        let hub = LocalHub::new(true);
        let conn = hub.connect(&Credential::default()).await.unwrap();
        let mut sub = conn.subscribe_playback().unwrap();
        assert_eq!(hub.connected_peers(), 1);

        conn.stop().await.unwrap();
        assert_eq!(hub.connected_peers(), 0);
        assert!(sub.recv().await.is_none());
        assert_eq!(conn.invoke(call(1.0, 10)).await, Err(HubError::Closed));
    }

    #[tokio::test]
    async fn test_failed_invoke_not_recorded() {
        let hub = LocalHub::new(true);
        let conn = hub.connect(&Credential::default()).await.unwrap();
        hub.set_fail_invokes(true);

        assert!(matches!(conn.invoke(call(1.0, 10)).await, Err(HubError::Invoke(_))));
        assert!(hub.invocations().is_empty());
    }
}
