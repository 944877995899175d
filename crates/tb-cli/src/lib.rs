//! tb-cli: Command-line interface for taskboard live updates
//!
//! Provides the `tb-notify` binary for watching and emitting change
//! notifications against a running taskboard daemon.

pub mod commands;
pub mod output;
