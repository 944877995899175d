//! Configuration management for the notification client

mod client;
pub mod serde_utils;

pub use client::{ClientConfig, ReconnectConfig};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the daemon socket path
pub const SOCKET_ENV_VAR: &str = "TASKBOARD_SOCKET";

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("notify.toml")
}

/// Get the default daemon socket path
///
/// Prefers the per-user runtime directory and falls back to `~/.taskboard`.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .map(|dir| dir.join("taskboard"))
        .or_else(|| dirs::home_dir().map(|home| home.join(".taskboard")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard.sock")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
