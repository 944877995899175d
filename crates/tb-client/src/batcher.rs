//! Outbound batching of local change notifications
//!
//! Callers push events into a bounded queue through [`OutboundSender`]. A
//! single [`Batcher`] task per connection generation drains the queue,
//! merges everything seen during one debounce window, and hands exactly one
//! coalesced event to its [`FlushSink`] per window.
//!
//! # Coalescing
//!
//! The pending record keeps the latest event and whether the window touched
//! more than one scope. A window that saw two distinct scopes, or any event
//! for `ScopeId::ALL`, flushes as a broadcast (`ScopeId::ALL`) so a burst
//! across projects is never narrowed to just one of them.
//!
//! # Backpressure
//!
//! [`OutboundSender::enqueue`] never blocks indefinitely. When the queue is
//! full it retries three times, waiting up to 50 ms, 100 ms and 200 ms for a
//! free slot, then returns [`NotifyError::Saturated`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use tb_core::{NotifyError, Result};
use tb_protocol::{Event, ScopeId};

/// Waits applied, in order, while the outbound queue stays full
const ENQUEUE_BACKOFF: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(200),
];

/// Destination for coalesced events
#[async_trait]
pub trait FlushSink: Send + Sync + 'static {
    /// Deliver one coalesced event
    async fn flush(&self, event: Event) -> Result<()>;
}

/// Create a bounded outbound queue
pub fn outbound_queue(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (OutboundSender { tx }, OutboundReceiver { rx })
}

/// Producer side of the outbound queue
#[derive(Debug, Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<Event>,
}

impl OutboundSender {
    /// Push an event, applying bounded-retry backpressure when full
    pub async fn enqueue(&self, event: Event) -> Result<()> {
        let event = match self.tx.try_send(event) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Closed(_)) => return Err(NotifyError::NotConnected),
            Err(TrySendError::Full(event)) => event,
        };

        for (attempt, delay) in ENQUEUE_BACKOFF.iter().enumerate() {
            match tokio::time::timeout(*delay, self.tx.reserve()).await {
                Ok(Ok(permit)) => {
                    permit.send(event);
                    return Ok(());
                }
                Ok(Err(_)) => return Err(NotifyError::NotConnected),
                Err(_) => {
                    tracing::debug!(attempt = attempt + 1, ?delay, "Outbound queue full");
                }
            }
        }

        tracing::warn!(
            scope = %event.scope_id,
            "Outbound queue saturated, giving up on notification"
        );
        Err(NotifyError::Saturated {
            attempts: ENQUEUE_BACKOFF.len() as u32,
        })
    }

    /// Whether the consuming batcher has shut the queue
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the outbound queue, owned by a [`Batcher`]
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::Receiver<Event>,
}

/// Events merged within one debounce window
#[derive(Debug, Default)]
struct Pending {
    latest: Option<Event>,
    broadcast: bool,
}

impl Pending {
    fn absorb(&mut self, event: Event) {
        let scope = event.scope_id;
        if let Some(latest) = &self.latest {
            if scope != latest.scope_id {
                self.broadcast = true;
            }
        }
        if scope.is_all() {
            self.broadcast = true;
        }
        self.latest = Some(event);
    }

    fn take(&mut self) -> Option<Event> {
        let mut event = self.latest.take()?;
        if std::mem::take(&mut self.broadcast) {
            event.scope_id = ScopeId::ALL;
        }
        event.sequence = 0;
        Some(event)
    }
}

/// Periodic coalescing task for one connection generation
pub struct Batcher {
    sink: Arc<dyn FlushSink>,
    debounce: Duration,
    generation: u64,
}

impl Batcher {
    /// Create a batcher that flushes into `sink` once per `debounce`
    pub fn new(sink: Arc<dyn FlushSink>, debounce: Duration, generation: u64) -> Self {
        Self {
            sink,
            debounce,
            generation,
        }
    }

    /// Start the batcher on its own task
    ///
    /// The task exits after a final flush when `cancel` fires or every
    /// [`OutboundSender`] for the queue is dropped.
    pub fn spawn(self, queue: OutboundReceiver, cancel: CancellationToken) -> BatcherHandle {
        let generation = self.generation;
        let task = tokio::spawn(self.run(queue.rx, cancel.clone()));
        BatcherHandle {
            cancel,
            task,
            generation,
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<Event>, cancel: CancellationToken) {
        let mut pending = Pending::default();
        let mut timer = tokio::time::interval(self.debounce);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        timer.tick().await;

        tracing::debug!(generation = self.generation, "Batcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        pending.absorb(event);
                    }
                    break;
                }

                _ = timer.tick() => {
                    self.flush(&mut pending).await;
                }

                event = rx.recv() => {
                    match event {
                        Some(event) => pending.absorb(event),
                        None => break, // Queue closed
                    }
                }
            }
        }

        self.flush(&mut pending).await;
        tracing::debug!(generation = self.generation, "Batcher stopped");
    }

    async fn flush(&self, pending: &mut Pending) {
        let Some(event) = pending.take() else {
            return;
        };

        let scope = event.scope_id;
        match self.sink.flush(event).await {
            Ok(()) => tracing::debug!(%scope, "Flushed coalesced change"),
            Err(e) => tracing::warn!(%scope, "Failed to flush coalesced change: {}", e),
        }
    }
}

/// Lifecycle handle for a running batcher
pub struct BatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    generation: u64,
}

impl BatcherHandle {
    /// Generation this batcher belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Close the queue, wait for the final flush and the task to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(generation = self.generation, "Batcher task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    struct RecordingSink {
        tx: mpsc::UnboundedSender<Event>,
    }

    #[async_trait]
    impl FlushSink for RecordingSink {
        async fn flush(&self, event: Event) -> Result<()> {
            let _ = self.tx.send(event);
            Ok(())
        }
    }

    fn recording_sink() -> (Arc<dyn FlushSink>, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingSink { tx }), rx)
    }

    fn change(scope: i64) -> Event {
        Event::database_changed(ScopeId::new(scope), 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_scopes_coalesce_to_broadcast() {
        let (sink, mut flushed) = recording_sink();
        let (sender, queue) = outbound_queue(100);
        let handle = Batcher::new(sink, Duration::from_millis(100), 1)
            .spawn(queue, CancellationToken::new());

        for scope in 1..=5 {
            sender.enqueue(change(scope)).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        let event = flushed.try_recv().unwrap();
        assert_eq!(event.scope_id, ScopeId::ALL);
        assert!(flushed.try_recv().is_err());

        handle.stop().await;
        assert!(flushed.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_scope_is_preserved() {
        let (sink, mut flushed) = recording_sink();
        let (sender, queue) = outbound_queue(100);
        let handle = Batcher::new(sink, Duration::from_millis(100), 1)
            .spawn(queue, CancellationToken::new());

        for _ in 0..3 {
            sender.enqueue(change(7)).await.unwrap();
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(flushed.try_recv().unwrap().scope_id, ScopeId::new(7));
        assert!(flushed.try_recv().is_err());

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_windows_flush_nothing() {
        let (sink, mut flushed) = recording_sink();
        let (_sender, queue) = outbound_queue(100);
        let handle = Batcher::new(sink, Duration::from_millis(100), 1)
            .spawn(queue, CancellationToken::new());

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(flushed.try_recv().is_err());

        handle.stop().await;
        assert!(flushed.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_window_flushes_separately() {
        let (sink, mut flushed) = recording_sink();
        let (sender, queue) = outbound_queue(100);
        let handle = Batcher::new(sink, Duration::from_millis(100), 1)
            .spawn(queue, CancellationToken::new());

        sender.enqueue(change(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        sender.enqueue(change(2)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(flushed.try_recv().unwrap().scope_id, ScopeId::new(1));
        assert_eq!(flushed.try_recv().unwrap().scope_id, ScopeId::new(2));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_performs_final_flush() {
        let (sink, mut flushed) = recording_sink();
        let (sender, queue) = outbound_queue(100);
        let handle = Batcher::new(sink, Duration::from_secs(10), 1)
            .spawn(queue, CancellationToken::new());

        sender.enqueue(change(3)).await.unwrap();
        handle.stop().await;

        assert_eq!(flushed.try_recv().unwrap().scope_id, ScopeId::new(3));
        assert!(sender.is_closed());
        assert!(matches!(
            sender.enqueue(change(4)).await,
            Err(NotifyError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_queue_flushes_and_exits() {
        let (sink, mut flushed) = recording_sink();
        let (sender, queue) = outbound_queue(100);
        let handle = Batcher::new(sink, Duration::from_secs(10), 1)
            .spawn(queue, CancellationToken::new());

        sender.enqueue(change(9)).await.unwrap();
        drop(sender);

        // Task exits on its own; stop only joins it
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(flushed.try_recv().unwrap().scope_id, ScopeId::new(9));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_queue_returns_error_after_retries() {
        let (sender, _queue) = outbound_queue(100);

        for scope in 0..100 {
            sender.enqueue(change(scope)).await.unwrap();
        }

        let started = Instant::now();
        let err = sender.enqueue(change(101)).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, NotifyError::Saturated { attempts: 3 }));
        assert!(err.to_string().contains("retries exhausted"));
        assert!(elapsed >= Duration::from_millis(350));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_succeeds_when_space_frees_during_retry() {
        let (sender, mut queue) = outbound_queue(1);
        sender.enqueue(change(1)).await.unwrap();

        let drain = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            queue.rx.recv().await
        });

        sender.enqueue(change(2)).await.unwrap();
        assert_eq!(drain.await.unwrap().unwrap().scope_id, ScopeId::new(1));
    }

    #[test]
    fn test_pending_broadcast_on_wildcard() {
        let mut pending = Pending::default();
        pending.absorb(change(4));
        pending.absorb(change(0));
        assert_eq!(pending.take().unwrap().scope_id, ScopeId::ALL);
        assert!(pending.take().is_none());
    }

    #[test]
    fn test_pending_resets_after_take() {
        let mut pending = Pending::default();
        pending.absorb(change(4));
        pending.absorb(change(5));
        assert_eq!(pending.take().unwrap().scope_id, ScopeId::ALL);

        pending.absorb(change(6));
        assert_eq!(pending.take().unwrap().scope_id, ScopeId::new(6));
    }
}
