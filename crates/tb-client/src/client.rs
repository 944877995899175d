//! Public client facade

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tb_core::{ClientConfig, Result};
use tb_protocol::{Event, ScopeId};

use crate::notify::{Notifier, NotifyCallback};
use crate::session::{ConnectionState, EventStream, Session};

/// Live-update client for the taskboard daemon
///
/// Wraps one [`Session`]. All methods take `&self`; share the client behind
/// an `Arc` to use it from several tasks.
///
/// ```no_run
/// # async fn demo() -> tb_core::Result<()> {
/// use std::time::Duration;
/// use futures::StreamExt;
/// use tb_client::NotifyClient;
/// use tb_core::ClientConfig;
/// use tb_protocol::ScopeId;
///
/// let client = NotifyClient::new(ClientConfig::default())?;
/// client.connect(Duration::from_secs(5)).await?;
/// client.subscribe(ScopeId::new(7)).await?;
///
/// let mut events = client.listen()?;
/// while let Some(event) = events.next().await {
///     println!("scope {} changed", event.scope_id);
/// }
/// client.close().await;
/// # Ok(())
/// # }
/// ```
pub struct NotifyClient {
    session: Arc<Session>,
}

impl NotifyClient {
    /// Create a client without a notification callback
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::build(config, Notifier::default())
    }

    /// Create a client that reports connection-health changes to `callback`
    pub fn with_notifier(config: ClientConfig, callback: NotifyCallback) -> Result<Self> {
        Self::build(config, Notifier::new(Some(callback)))
    }

    fn build(config: ClientConfig, notifier: Notifier) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            session: Session::new(config, notifier),
        })
    }

    /// Connect to the daemon within `timeout`
    pub async fn connect(&self, timeout: Duration) -> Result<()> {
        self.session.connect(timeout).await
    }

    /// Queue a change notification; bursts are coalesced before sending
    pub async fn send(&self, event: Event) -> Result<()> {
        self.session.send(event).await
    }

    /// Fire-and-forget change notification for `scope`
    ///
    /// Failures are logged, never returned.
    pub async fn notify_scope_changed(&self, scope: ScopeId) {
        let event = Event::database_changed(scope, tb_core::time::current_time_millis());
        if let Err(e) = self.session.send(event).await {
            tracing::warn!(%scope, "Dropping change notification: {}", e);
        }
    }

    /// Limit incoming events to `scope`; [`ScopeId::ALL`] widens back to everything
    pub async fn subscribe(&self, scope: ScopeId) -> Result<()> {
        self.session.subscribe(scope).await
    }

    /// Stream of ordered, de-duplicated events
    pub fn listen(&self) -> Result<EventStream> {
        self.session.listen(CancellationToken::new())
    }

    /// Like [`listen`](Self::listen), ending early when `cancel` fires
    pub fn listen_until(&self, cancel: CancellationToken) -> Result<EventStream> {
        self.session.listen(cancel)
    }

    /// Flush pending notifications and disconnect; safe to call repeatedly
    pub async fn close(&self) {
        self.session.close().await
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn last_sequence(&self) -> i64 {
        self.session.last_sequence()
    }

    pub fn current_scope(&self) -> ScopeId {
        self.session.current_scope()
    }

    /// Number of successful dials, including reconnects
    pub fn generation(&self) -> u64 {
        self.session.generation()
    }

    pub fn config(&self) -> &ClientConfig {
        self.session.config()
    }
}

impl std::fmt::Debug for NotifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyClient")
            .field("socket_path", &self.config().socket_path)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for NotifyClient {
    fn drop(&mut self) {
        // Stops background tasks; pending events are not flushed without close()
        self.session.cancel_token().cancel();
    }
}
