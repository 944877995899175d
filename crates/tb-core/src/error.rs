//! Core error types for the taskboard notification client

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tb_protocol::ProtocolError;
use thiserror::Error;

/// Result alias used by every public client operation
pub type Result<T, E = NotifyError> = std::result::Result<T, E>;

/// Top-level error type for client operations
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Operation needs a live connection and there is none
    #[error("Not connected to the taskboard daemon")]
    NotConnected,

    /// Client has been closed
    #[error("Client is closed")]
    Closed,

    /// Reconnect budget was exhausted; the session is finished
    #[error("Session terminated: daemon unreachable after reconnect attempts")]
    Terminated,

    /// Outbound queue stayed full through every backpressure retry
    #[error("Outbound queue saturated: retries exhausted after {attempts} attempts")]
    Saturated { attempts: u32 },

    /// Write did not complete before the write deadline
    #[error("Write timed out after {0:?}")]
    WriteTimeout(Duration),

    /// Nothing was read before the read deadline
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Dial did not complete before the connect deadline
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Peer closed the stream
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Dial failed
    #[error("{0}")]
    Daemon(#[from] DaemonError),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Broad category of a failed dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonErrorKind {
    /// No socket file at the configured path
    SocketNotFound,
    /// Socket exists but the current user may not open it
    PermissionDenied,
    /// Socket exists but nothing is listening on it
    ConnectionRefused,
    /// Anything else
    Other,
}

/// A dial failure with a short explanation and an operator hint
///
/// Classification only shapes what is shown to a human; the session treats
/// every kind the same way.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DaemonError {
    /// Category
    pub kind: DaemonErrorKind,
    /// Socket that was dialed
    pub socket_path: PathBuf,
    /// One-line explanation
    pub message: String,
    hint: &'static str,
    #[source]
    source: io::Error,
}

impl DaemonError {
    /// Classify a dial error
    pub fn classify(source: io::Error, socket_path: &Path) -> Self {
        let path = socket_path.display();
        let (kind, message, hint) = match source.kind() {
            io::ErrorKind::NotFound => (
                DaemonErrorKind::SocketNotFound,
                format!("Daemon socket not found at {}", path),
                "Start the taskboard daemon, or point --socket at the running one",
            ),
            io::ErrorKind::PermissionDenied => (
                DaemonErrorKind::PermissionDenied,
                format!("Permission denied opening daemon socket {}", path),
                "Run as the user that owns the daemon, or restart the daemon as this user",
            ),
            io::ErrorKind::ConnectionRefused => (
                DaemonErrorKind::ConnectionRefused,
                format!("Daemon refused the connection on {}", path),
                "The socket is stale; restart the taskboard daemon",
            ),
            _ => (
                DaemonErrorKind::Other,
                format!("Failed to reach daemon at {}: {}", path, source),
                "Restart the taskboard daemon and try again",
            ),
        };

        Self {
            kind,
            socket_path: socket_path.to_path_buf(),
            message,
            hint,
            source,
        }
    }

    /// Actionable suggestion for the operator
    pub fn hint(&self) -> &str {
        self.hint
    }
}
