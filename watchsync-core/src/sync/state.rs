//! Session State Management

use tokio::time::Instant;

use super::protocol::PlaybackState;

/// Role of the local viewer, fixed for the session lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Source of playback truth
    Host,
    /// Mirrors the host
    Follower,
}

impl Role {
    /// Assign a role by comparing the local identity to the configured host identity
    pub fn assign(identity: &str, host_identity: &str) -> Self {
        if identity == host_identity {
            Role::Host
        } else {
            Role::Follower
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

/// Lifecycle of a sync session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected (initial, or after a failed connect)
    Disconnected,
    /// Hub handshake in progress
    Connecting,
    /// Hub connected, sync running
    Connected,
    /// Torn down; this instance cannot be mounted again
    Closed,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }
}

/// Last known host state, kept for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostView {
    pub state: PlaybackState,
    /// When we applied it
    pub received_at: Instant,
}

impl HostView {
    pub fn new(state: PlaybackState) -> Self {
        Self {
            state,
            received_at: Instant::now(),
        }
    }

    /// Label shown next to the host timestamp
    pub fn playback_label(&self) -> &'static str {
        if self.state.playing {
            "Playing"
        } else {
            "Paused"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_assignment_is_exact() {
        assert_eq!(Role::assign("suchit", "suchit"), Role::Host);
        assert_eq!(Role::assign("Suchit", "suchit"), Role::Follower);
        assert_eq!(Role::assign("", "suchit"), Role::Follower);
    }

    #[test]
    fn test_host_view_label() {
        let view = HostView::new(PlaybackState::new(false, 3.0, 0));
        assert_eq!(view.playback_label(), "Paused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_view_age_follows_runtime_clock() {
        let view = HostView::new(PlaybackState::new(true, 3.0, 0));
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        assert_eq!(view.received_at.elapsed(), std::time::Duration::from_secs(5));
    }
}
