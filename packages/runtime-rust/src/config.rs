//! Runtime configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::invalidation::InvalidationConfig;
use crate::notifications::DEFAULT_NOTIFICATION_TTL;
use crate::registrations::ReleaseMode;

/// Top-level configuration for the [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Delay after which non-error notifications are removed.
    pub notification_ttl: Duration,
    /// How `unregister` treats previously registered flags.
    pub release_mode: ReleaseMode,
    /// Push channel settings.
    pub push: PushConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            notification_ttl: DEFAULT_NOTIFICATION_TTL,
            release_mode: ReleaseMode::default(),
            push: PushConfig::default(),
        }
    }
}

/// Push channel endpoint and retry settings.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// WebSocket endpoint of the STOMP broker.
    pub url: String,
    /// Destination prefix; the user id is appended.
    pub topic_prefix: String,
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on the WebSocket handshake plus STOMP `CONNECTED`.
    pub connect_timeout: Duration,
}

impl PushConfig {
    /// Destination the listener subscribes to for `user_id`.
    #[must_use]
    pub fn destination(&self, user_id: &str) -> String {
        format!("{}{user_id}", self.topic_prefix)
    }
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:39857/ws-notifications/websocket".to_string(),
            topic_prefix: "/topic/notifications/".to_string(),
            reconnect_delay: Duration::from_millis(5000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Errors from loading configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads an [`InvalidationConfig`] from a JSON file.
///
/// # Errors
///
/// Returns `ConfigError::Io` if the file cannot be read and
/// `ConfigError::Parse` if it is not a map of domain to key prefixes.
pub fn load_invalidation_config(path: impl AsRef<Path>) -> Result<InvalidationConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: InvalidationConfig =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), domains = config.domains().count(), "invalidation config loaded");
    Ok(config)
}
