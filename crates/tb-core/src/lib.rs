//! tb-core: Configuration and error types for the taskboard notification client
//!
//! This crate holds the pieces shared by the client engine and the CLI:
//! tunables with their defaults, the error taxonomy, transport error
//! classification for operator-facing diagnostics, and time helpers.

pub mod config;
pub mod error;
pub mod time;

pub use config::{ClientConfig, ReconnectConfig};
pub use error::{ConfigError, DaemonError, DaemonErrorKind, NotifyError, Result};
