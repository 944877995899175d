//! Protocol error types

use thiserror::Error;

/// Errors that can occur while framing or parsing messages
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A single record exceeded the maximum line length
    #[error("Record too long: exceeds maximum of {max} bytes")]
    LineTooLong { max: usize },

    /// The record was not a valid message envelope
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Envelope kind requires a payload that was not present
    #[error("Missing {kind} payload in envelope")]
    MissingPayload { kind: &'static str },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
