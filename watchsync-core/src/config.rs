//! Session configuration
//!
//! Everything the sync core needs about the local viewer is passed in here
//! explicitly; nothing is read from ambient storage.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default drift tolerance before a follower seeks (seconds)
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 0.5;

/// Default host heartbeat interval (ms)
const DEFAULT_HEARTBEAT_MS: u64 = 1000;

/// Default debounce window for scrub-seeking (ms)
const DEFAULT_SEEK_DEBOUNCE_MS: u64 = 500;

/// Default feedback suppression window (ms)
const DEFAULT_FEEDBACK_WINDOW_MS: u64 = 1000;

/// Default cap on latency extrapolation (ms)
const DEFAULT_MAX_EXTRAPOLATION_MS: u64 = 5000;

/// Bearer credential used for the hub handshake
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Whether the hub delivers a sender's own broadcasts back to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EchoPolicy {
    /// Trust the hub's declared capability; assume echo when it is unknown
    #[default]
    Auto,
    /// The hub echoes; keep the feedback guard active
    Echoes,
    /// The hub never echoes; the feedback guard is inert
    NoEcho,
}

impl EchoPolicy {
    /// Resolve against what the hub declares about itself
    pub fn resolve(&self, declared: Option<bool>) -> bool {
        match self {
            EchoPolicy::Auto => declared.unwrap_or(true),
            EchoPolicy::Echoes => true,
            EchoPolicy::NoEcho => false,
        }
    }
}

/// Configuration for one sync session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identity of the local viewer
    pub identity: String,
    /// Identity of the viewer who hosts
    pub host_identity: String,
    /// Bearer credential for the hub
    pub credential: Credential,
    /// Drift tolerated before a follower seeks (seconds)
    pub tolerance_seconds: f64,
    /// Host heartbeat interval (ms)
    pub heartbeat_interval_ms: u64,
    /// Debounce window for continuous seeks (ms)
    pub seek_debounce_ms: u64,
    /// Feedback suppression window around host actions (ms)
    pub feedback_window_ms: u64,
    /// Whether followers extrapolate the host position by elapsed time
    pub extrapolate: bool,
    /// Upper bound on extrapolation (ms)
    pub max_extrapolation_ms: u64,
    pub echo: EchoPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            identity: String::new(),
            host_identity: String::new(),
            credential: Credential::default(),
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_MS,
            seek_debounce_ms: DEFAULT_SEEK_DEBOUNCE_MS,
            feedback_window_ms: DEFAULT_FEEDBACK_WINDOW_MS,
            extrapolate: true,
            max_extrapolation_ms: DEFAULT_MAX_EXTRAPOLATION_MS,
            echo: EchoPolicy::Auto,
        }
    }
}

impl SessionConfig {
    /// Create a config with default timings
    pub fn new(
        identity: impl Into<String>,
        host_identity: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            identity: identity.into(),
            host_identity: host_identity.into(),
            credential,
            ..Self::default()
        }
    }

    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Parse and validate a JSON config
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity.is_empty() {
            return Err(ConfigError::Invalid("identity is empty".to_string()));
        }
        if self.host_identity.is_empty() {
            return Err(ConfigError::Invalid("host_identity is empty".to_string()));
        }
        if !(self.tolerance_seconds >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "tolerance_seconds must be >= 0, got {}",
                self.tolerance_seconds
            )));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn seek_debounce(&self) -> Duration {
        Duration::from_millis(self.seek_debounce_ms)
    }

    pub fn feedback_window(&self) -> Duration {
        Duration::from_millis(self.feedback_window_ms)
    }

    pub fn max_extrapolation(&self) -> Duration {
        Duration::from_millis(self.max_extrapolation_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = SessionConfig::from_json(
            r#"{"identity":"guest","host_identity":"suchit","credential":"tok"}"#,
        )
        .unwrap();

        assert_eq!(config.tolerance_seconds, 0.5);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(1));
        assert_eq!(config.seek_debounce(), Duration::from_millis(500));
        assert_eq!(config.echo, EchoPolicy::Auto);
        assert_eq!(config.credential.bearer_header(), "Bearer tok");
    }

    #[test]
    fn test_rejects_missing_identity() {
        let err = SessionConfig::from_json(r#"{"host_identity":"suchit"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_echo_policy_resolution() {
        assert!(EchoPolicy::Auto.resolve(None));
        assert!(!EchoPolicy::Auto.resolve(Some(false)));
        assert!(EchoPolicy::Echoes.resolve(Some(false)));
        assert!(!EchoPolicy::NoEcho.resolve(Some(true)));
    }

    #[test]
    fn test_credential_not_logged() {
        let cred = Credential::new("secret");
        assert_eq!(format!("{:?}", cred), "Credential(***)");
    }
}
