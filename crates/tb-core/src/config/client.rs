//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::serde_utils::duration_millis;
use crate::error::ConfigError;

/// Tunables for the notification client
///
/// Every field is optional in the TOML file; missing fields take the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Path of the daemon's listening socket
    pub socket_path: PathBuf,

    /// Coalescing window for outbound change notifications
    #[serde(with = "duration_millis")]
    pub debounce: Duration,

    /// Capacity of the outbound queue
    pub queue_capacity: usize,

    /// Deadline applied to each individual write
    #[serde(with = "duration_millis")]
    pub write_timeout: Duration,

    /// Longest silence tolerated from the daemon before the connection is
    /// considered lost
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,

    /// Dial deadline used by automatic reconnect attempts
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,

    /// Depth of the inbound delivery channel
    pub event_buffer: usize,

    /// Reconnect policy
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: super::default_socket_path(),
            debounce: Duration::from_millis(100),
            queue_capacity: 100,
            write_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            event_buffer: 64,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at a specific socket
    pub fn with_socket_path(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            ..Self::default()
        }
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when the file does not exist
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(super::default_config_path);

        let config = match super::load_config::<Self>(&path) {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::Invalid(
                "event_buffer must be at least 1".to_string(),
            ));
        }
        if self.debounce.is_zero() {
            return Err(ConfigError::Invalid(
                "debounce must be greater than zero".to_string(),
            ));
        }
        let multiplier = self.reconnect.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "reconnect.multiplier must be a finite number >= 1.0, got {}",
                multiplier
            )));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(ConfigError::Invalid(format!(
                "reconnect.jitter must be within 0.0..=1.0, got {}",
                self.reconnect.jitter
            )));
        }
        Ok(())
    }
}

/// Exponential backoff configuration for automatic reconnection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first attempt
    #[serde(with = "duration_millis")]
    pub base_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,

    /// Attempts before the session gives up
    pub max_retries: u32,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 5,
            multiplier: 2.0,
            jitter: 0.0,
        }
    }
}
