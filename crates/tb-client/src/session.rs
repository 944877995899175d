//! Session manager: one resilient connection to the daemon
//!
//! The session owns the socket, the subscription state and the reconnect
//! state machine:
//!
//! ```text
//! Disconnected → Connecting → Connected → Reconnecting → Connected
//!                                                      ↘ Terminated
//! ```
//!
//! `Closed` can be entered from any state and is final.
//!
//! ## Locking
//!
//! Shared state lives behind a single `std::sync::Mutex` held only for short,
//! non-blocking sections. Dialing, reading, writing and backoff sleeps happen
//! outside it; callers copy out the handle they need (the writer, the
//! outbound sender) and release the lock first.
//!
//! ## Generations
//!
//! Each successful dial starts a new generation with a fresh outbound queue.
//! The previous generation's batcher is stopped, including its final flush,
//! before the new one is spawned, so at most one batcher runs at a time.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::stream::{self, BoxStream};
use futures::{SinkExt, StreamExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use tb_core::time::current_time_millis;
use tb_core::{ClientConfig, DaemonError, NotifyError, Result};
use tb_protocol::{Event, Message, MessageCodec, MessageKind, ScopeId};

use crate::backoff::ExponentialBackoff;
use crate::batcher::{outbound_queue, Batcher, BatcherHandle, FlushSink, OutboundSender};
use crate::notify::{Notifier, NotifyLevel};
use crate::sequencer::Sequencer;

type Reader = FramedRead<OwnedReadHalf, MessageCodec>;
type Writer = FramedWrite<OwnedWriteHalf, MessageCodec>;
type SharedWriter = Arc<tokio::sync::Mutex<Writer>>;
/// Joinable stop of a superseded batcher
type Retiring = Shared<BoxFuture<'static, ()>>;

/// Stream of admitted inbound events
pub type EventStream = BoxStream<'static, Event>;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or the first dial failed
    Disconnected,
    /// First dial in progress
    Connecting,
    /// Live connection
    Connected,
    /// Connection lost, retrying with backoff
    Reconnecting,
    /// Reconnect budget exhausted
    Terminated,
    /// Closed by the owner
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Terminated => "terminated",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Mutable state guarded by the session lock
struct SessionState {
    phase: ConnectionState,
    writer: Option<SharedWriter>,
    current_scope: ScopeId,
    sequencer: Sequencer,
    outbound: Option<OutboundSender>,
    batcher: Option<BatcherHandle>,
    /// Previous generation's batcher while its final flush is in flight
    retiring: Option<Retiring>,
    /// Handed to the reader task on first connect
    inbound_tx: Option<mpsc::Sender<Event>>,
    reader_task: Option<JoinHandle<()>>,
    generation: u64,
}

/// Why a read loop stopped
enum ReadExit {
    Cancelled,
    Failed(NotifyError),
}

/// A resilient connection to the daemon
pub struct Session {
    config: ClientConfig,
    state: Mutex<SessionState>,
    /// Serializes caller-initiated connects
    connect_gate: tokio::sync::Mutex<()>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Event>>>,
    cancel: CancellationToken,
    notifier: Notifier,
}

impl Session {
    /// Create a disconnected session
    pub(crate) fn new(config: ClientConfig, notifier: Notifier) -> Arc<Self> {
        let (inbound_tx, inbound_rx) = mpsc::channel(config.event_buffer);

        Arc::new(Self {
            config,
            state: Mutex::new(SessionState {
                phase: ConnectionState::Disconnected,
                writer: None,
                current_scope: ScopeId::ALL,
                sequencer: Sequencer::new(),
                outbound: None,
                batcher: None,
                retiring: None,
                inbound_tx: Some(inbound_tx),
                reader_task: None,
                generation: 0,
            }),
            connect_gate: tokio::sync::Mutex::new(()),
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
            cancel: CancellationToken::new(),
            notifier,
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // No section leaves the state half-updated, so a poisoned guard is usable
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Session configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.lock().phase
    }

    /// Highest admitted inbound sequence
    pub fn last_sequence(&self) -> i64 {
        self.lock().sequencer.last()
    }

    /// Scope recorded by the last `subscribe`
    pub fn current_scope(&self) -> ScopeId {
        self.lock().current_scope
    }

    /// Number of successful dials so far
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Dial the daemon and start the reader and batcher tasks
    ///
    /// Returns immediately if the session is already connected or is
    /// reconnecting on its own.
    pub async fn connect(self: &Arc<Self>, timeout: Duration) -> Result<()> {
        let _gate = self.connect_gate.lock().await;

        {
            let mut state = self.lock();
            match state.phase {
                ConnectionState::Closed => return Err(NotifyError::Closed),
                ConnectionState::Terminated => return Err(NotifyError::Terminated),
                ConnectionState::Connected | ConnectionState::Reconnecting => return Ok(()),
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    state.phase = ConnectionState::Connecting;
                }
            }
        }

        let reader = match self.establish(timeout).await {
            Ok(reader) => reader,
            Err(e) => {
                let mut state = self.lock();
                if state.phase == ConnectionState::Connecting {
                    state.phase = ConnectionState::Disconnected;
                }
                return Err(e);
            }
        };

        let mut state = self.lock();
        let events = state.inbound_tx.take().ok_or(NotifyError::Closed)?;
        let session = Arc::clone(self);
        state.reader_task = Some(tokio::spawn(session.run_reader(reader, events)));
        Ok(())
    }

    /// Dial, announce the default subscription and start a new generation
    async fn establish(self: &Arc<Self>, timeout: Duration) -> Result<Reader> {
        let stream = dial(&self.config.socket_path, timeout).await?;
        let (read_half, write_half) = stream.into_split();
        let reader = FramedRead::new(read_half, MessageCodec::new());
        let writer: SharedWriter = Arc::new(tokio::sync::Mutex::new(FramedWrite::new(
            write_half,
            MessageCodec::new(),
        )));

        write_with_deadline(
            &writer,
            Message::subscribe(ScopeId::ALL),
            self.config.write_timeout,
        )
        .await?;

        let (outbound, queue) = outbound_queue(self.config.queue_capacity);
        let (retiring, generation) = {
            let mut state = self.lock();
            if state.phase == ConnectionState::Closed {
                return Err(NotifyError::Closed);
            }
            state.writer = Some(writer);
            state.outbound = Some(outbound);
            state.generation += 1;
            state.phase = ConnectionState::Connected;
            // Parked in state so `close` can still join it if this future is dropped
            let retiring = state.batcher.take().map(|previous| {
                tracing::debug!(generation = previous.generation(), "Retiring batcher");
                previous.stop().boxed().shared()
            });
            state.retiring = retiring.clone();
            (retiring, state.generation)
        };

        // Retire the old batcher first; its final flush lands on the new writer
        if let Some(retiring) = retiring {
            retiring.await;
            self.lock().retiring = None;
        }

        let sink: Arc<dyn FlushSink> = Arc::clone(self) as Arc<dyn FlushSink>;
        let handle = Batcher::new(sink, self.config.debounce, generation)
            .spawn(queue, self.cancel.child_token());

        let orphan = {
            let mut state = self.lock();
            if state.phase == ConnectionState::Closed {
                Some(handle)
            } else {
                state.batcher = Some(handle);
                None
            }
        };
        if let Some(orphan) = orphan {
            orphan.stop().await;
            return Err(NotifyError::Closed);
        }

        tracing::info!(
            generation,
            socket = %self.config.socket_path.display(),
            "Connected to taskboard daemon"
        );
        Ok(reader)
    }

    /// Write one message under the per-write deadline
    async fn write(&self, message: Message) -> Result<()> {
        let writer = self.lock().writer.clone().ok_or(NotifyError::NotConnected)?;
        write_with_deadline(&writer, message, self.config.write_timeout).await
    }

    /// Queue a change notification for the batcher
    pub async fn send(&self, event: Event) -> Result<()> {
        let outbound = {
            let state = self.lock();
            match state.phase {
                ConnectionState::Closed => return Err(NotifyError::Closed),
                ConnectionState::Terminated => return Err(NotifyError::Terminated),
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    return Err(NotifyError::NotConnected)
                }
                ConnectionState::Connected | ConnectionState::Reconnecting => state
                    .outbound
                    .clone()
                    .ok_or(NotifyError::NotConnected)?,
            }
        };

        outbound.enqueue(event).await
    }

    /// Narrow the daemon's forwarding to one scope
    ///
    /// While reconnecting, the scope is only recorded; it is sent as soon as
    /// the connection is restored.
    pub async fn subscribe(&self, scope: ScopeId) -> Result<()> {
        let writer = {
            let mut state = self.lock();
            match state.phase {
                ConnectionState::Closed => return Err(NotifyError::Closed),
                ConnectionState::Terminated => return Err(NotifyError::Terminated),
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    return Err(NotifyError::NotConnected)
                }
                ConnectionState::Reconnecting => {
                    state.current_scope = scope;
                    return Ok(());
                }
                ConnectionState::Connected => {
                    state.current_scope = scope;
                    state.writer.clone().ok_or(NotifyError::NotConnected)?
                }
            }
        };

        tracing::debug!(%scope, "Subscribing");
        write_with_deadline(&writer, Message::subscribe(scope), self.config.write_timeout).await
    }

    /// Stream of admitted events
    ///
    /// Several streams may exist; each event goes to exactly one of them.
    /// Dropping a stream and calling `listen` again picks up at the next
    /// undelivered event. The stream ends when the session terminates or
    /// closes, or when `cancel` fires.
    pub fn listen(&self, cancel: CancellationToken) -> Result<EventStream> {
        {
            let state = self.lock();
            match state.phase {
                ConnectionState::Closed => return Err(NotifyError::Closed),
                ConnectionState::Terminated => return Err(NotifyError::Terminated),
                _ if state.reader_task.is_none() => return Err(NotifyError::NotConnected),
                _ => {}
            }
        }

        let receiver = Arc::clone(&self.inbound_rx);
        let session = self.cancel.clone();

        let events = stream::unfold(
            (receiver, session, cancel),
            |(receiver, session, cancel)| async move {
                let next = {
                    let mut rx = tokio::select! {
                        guard = receiver.lock() => guard,
                        _ = cancel.cancelled() => return None,
                        _ = session.cancelled() => return None,
                    };
                    tokio::select! {
                        event = rx.recv() => event,
                        _ = cancel.cancelled() => None,
                        _ = session.cancelled() => None,
                    }
                };
                next.map(|event| (event, (receiver, session, cancel)))
            },
        );

        Ok(events.boxed())
    }

    /// Tear everything down; later calls are no-ops
    pub async fn close(&self) {
        let (retiring, batcher, reader_task) = {
            let mut state = self.lock();
            if state.phase == ConnectionState::Closed {
                return;
            }
            state.phase = ConnectionState::Closed;
            state.outbound = None;
            state.inbound_tx = None;
            (
                state.retiring.take(),
                state.batcher.take(),
                state.reader_task.take(),
            )
        };

        self.cancel.cancel();

        if let Some(retiring) = retiring {
            retiring.await;
        }

        // Final flush still goes out on the live writer
        if let Some(batcher) = batcher {
            batcher.stop().await;
        }

        let writer = self.lock().writer.take();
        if let Some(writer) = writer {
            let mut writer = writer.lock().await;
            if let Err(e) = writer.close().await {
                tracing::debug!("Error closing daemon connection: {}", e);
            }
        }

        if let Some(task) = reader_task {
            if let Err(e) = task.await {
                tracing::warn!("Reader task failed: {}", e);
            }
        }

        tracing::debug!("Session closed");
    }

    /// Reader task: runs read loops and reconnects between them
    async fn run_reader(self: Arc<Self>, mut reader: Reader, events: mpsc::Sender<Event>) {
        loop {
            match self.read_loop(&mut reader, &events).await {
                ReadExit::Cancelled => break,
                ReadExit::Failed(e) => {
                    if self.cancel.is_cancelled() {
                        break;
                    }

                    tracing::warn!("Connection to daemon lost: {}", e);
                    self.notifier.emit(
                        NotifyLevel::Warning,
                        &format!("Connection to taskboard daemon lost ({}); reconnecting", e),
                    );

                    match self.reconnect().await {
                        Some(next) => reader = next,
                        None => break,
                    }
                }
            }
        }
        // Dropping `events` ends every listen stream
    }

    async fn read_loop(&self, reader: &mut Reader, events: &mpsc::Sender<Event>) -> ReadExit {
        let read_timeout = self.config.read_timeout;

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return ReadExit::Cancelled,
                next = tokio::time::timeout(read_timeout, reader.next()) => next,
            };

            let message = match next {
                Err(_) => return ReadExit::Failed(NotifyError::ReadTimeout(read_timeout)),
                Ok(None) => {
                    return ReadExit::Failed(NotifyError::ConnectionLost(
                        "daemon closed the connection".to_string(),
                    ))
                }
                Ok(Some(Err(e))) => return ReadExit::Failed(e.into()),
                Ok(Some(Ok(message))) => message,
            };

            if message.has_foreign_version() {
                tracing::warn!(
                    version = message.version,
                    "Daemon speaks a different protocol version"
                );
            }

            match message.kind {
                MessageKind::Event => {
                    let event = match message.into_event() {
                        Ok(event) => event,
                        Err(e) => return ReadExit::Failed(e.into()),
                    };

                    if !self.lock().sequencer.admit(event.sequence) {
                        tracing::debug!(sequence = event.sequence, "Dropping stale event");
                        continue;
                    }

                    tracing::debug!(
                        sequence = event.sequence,
                        scope = %event.scope_id,
                        "Delivering event"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return ReadExit::Cancelled,
                        sent = events.send(event) => {
                            if sent.is_err() {
                                return ReadExit::Cancelled;
                            }
                        }
                    }
                }
                MessageKind::Ping => {
                    if let Err(e) = self.write(Message::pong(current_time_millis())).await {
                        tracing::warn!("Failed to answer ping: {}", e);
                    }
                }
                kind => {
                    tracing::debug!(%kind, "Ignoring message");
                }
            }
        }
    }

    /// Redial with exponential backoff
    ///
    /// Returns the new reader, or `None` once cancelled or out of attempts.
    async fn reconnect(self: &Arc<Self>) -> Option<Reader> {
        {
            let mut state = self.lock();
            if state.phase == ConnectionState::Closed {
                return None;
            }
            state.phase = ConnectionState::Reconnecting;
            state.writer = None;
        }

        let max_retries = self.config.reconnect.max_retries;
        let mut backoff = ExponentialBackoff::from_config(&self.config.reconnect);

        for attempt in 1..=max_retries {
            let delay = backoff.next_delay();
            tracing::info!(attempt, max_retries, ?delay, "Reconnecting to daemon");

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = self.establish(self.config.connect_timeout) => result,
            };

            match result {
                Ok(reader) => {
                    tracing::info!(attempt, "Reconnected to daemon");
                    self.notifier
                        .emit(NotifyLevel::Info, "Reconnected to taskboard daemon");
                    self.restore_subscription().await;
                    return Some(reader);
                }
                Err(e) => {
                    tracing::warn!(attempt, max_retries, "Reconnect attempt failed: {}", e);
                    self.notifier.emit(
                        NotifyLevel::Warning,
                        &format!("Reconnect attempt {}/{} failed: {}", attempt, max_retries, e),
                    );
                }
            }
        }

        self.terminate(max_retries).await;
        None
    }

    /// Re-issue the caller's subscription on a fresh connection
    async fn restore_subscription(&self) {
        let scope = self.current_scope();
        if scope.is_all() {
            return;
        }

        match self.write(Message::subscribe(scope)).await {
            Ok(()) => tracing::debug!(%scope, "Restored subscription"),
            Err(e) => tracing::warn!(%scope, "Failed to restore subscription: {}", e),
        }
    }

    async fn terminate(&self, attempts: u32) {
        let batcher = {
            let mut state = self.lock();
            if state.phase == ConnectionState::Closed {
                return;
            }
            state.phase = ConnectionState::Terminated;
            state.writer = None;
            state.outbound = None;
            state.batcher.take()
        };

        if let Some(batcher) = batcher {
            batcher.stop().await;
        }

        tracing::error!(attempts, "Giving up on taskboard daemon");
        self.notifier.emit(
            NotifyLevel::Error,
            &format!(
                "Taskboard daemon unreachable after {} reconnect attempts; live updates stopped",
                attempts
            ),
        );
    }
}

#[async_trait]
impl FlushSink for Session {
    async fn flush(&self, event: Event) -> Result<()> {
        self.write(Message::event(event)).await
    }
}

/// Dial the daemon socket within `timeout`
async fn dial(socket_path: &Path, timeout: Duration) -> Result<UnixStream> {
    match tokio::time::timeout(timeout, UnixStream::connect(socket_path)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(DaemonError::classify(e, socket_path).into()),
        Err(_) => Err(NotifyError::ConnectTimeout(timeout)),
    }
}

/// Encode one message with a deadline scoped to this call alone
///
/// The deadline is dropped together with the write future, so it can never
/// leak into a later, unrelated write.
async fn write_with_deadline(
    writer: &SharedWriter,
    message: Message,
    deadline: Duration,
) -> Result<()> {
    let mut writer = writer.lock().await;
    match tokio::time::timeout(deadline, writer.send(message)).await {
        Ok(result) => result.map_err(NotifyError::from),
        Err(_) => Err(NotifyError::WriteTimeout(deadline)),
    }
}
