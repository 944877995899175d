//! Live-update client for the taskboard daemon
//!
//! Connects to the daemon's Unix socket, forwards local change notifications
//! in coalesced batches, and delivers the daemon's change events in order.
//! Connection loss is handled transparently: the client redials with
//! exponential backoff, restores the caller's subscription, and reports
//! health changes through an optional [`NotifyCallback`].
//!
//! - [`sequencer`]: ordering and de-duplication of inbound events
//! - [`batcher`]: debounced, coalescing outbound queue
//! - [`session`]: socket lifecycle and reconnect state machine
//! - [`client`]: the public [`NotifyClient`] facade

pub mod backoff;
pub mod batcher;
pub mod client;
pub mod notify;
pub mod sequencer;
pub mod session;

pub use client::NotifyClient;
pub use notify::{NotifyCallback, NotifyLevel};
pub use session::{ConnectionState, EventStream};

pub use tb_core::{ClientConfig, NotifyError, ReconnectConfig, Result};
pub use tb_protocol::{Event, EventType, ScopeId};
