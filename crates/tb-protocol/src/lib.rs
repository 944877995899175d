//! tb-protocol: Wire protocol for taskboard change notifications
//!
//! This crate defines the envelope exchanged between the taskboard daemon
//! and its clients over a local socket, and the newline-delimited JSON codec
//! used to frame it.

pub mod codec;
pub mod error;
pub mod message;
pub mod scope;

pub use codec::{MessageCodec, MAX_LINE_LENGTH};
pub use error::ProtocolError;
pub use message::{Event, EventType, Message, MessageKind, SubscribeRequest, PROTOCOL_VERSION};
pub use scope::ScopeId;
