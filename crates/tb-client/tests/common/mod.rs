//! Fake taskboard daemon for integration tests
//!
//! Listens on a Unix socket inside a temp dir, records every message a
//! client sends, and lets the test push lines to the latest connection.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tb_client::{ClientConfig, NotifyCallback, NotifyLevel, ReconnectConfig};
use tb_protocol::Message;

pub struct FakeDaemon {
    path: PathBuf,
    received: mpsc::UnboundedReceiver<Message>,
    current: Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>>,
    accept_task: JoinHandle<()>,
}

impl FakeDaemon {
    /// Bind at `path`, replacing any stale socket file
    pub async fn start(path: &Path) -> Self {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path).expect("Failed to bind fake daemon");
        let (tx, received) = mpsc::unbounded_channel();
        let current: Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>> = Arc::default();

        let slot = Arc::clone(&current);
        let accept_task = tokio::spawn(async move {
            let mut readers = Vec::new();
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let (read_half, write_half) = stream.into_split();
                *slot.lock().await = Some(write_half);

                let tx = tx.clone();
                readers.push(tokio::spawn(async move {
                    let mut lines = BufReader::new(read_half).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let message: Message =
                            serde_json::from_str(&line).expect("Client sent invalid JSON");
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                }));
            }
            for reader in readers {
                reader.abort();
            }
        });

        Self {
            path: path.to_path_buf(),
            received,
            current,
            accept_task,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one message to the latest connection
    pub async fn send(&self, message: &Message) {
        let line = serde_json::to_string(message).expect("Failed to serialize message");
        self.send_raw(&line).await;
    }

    /// Write a raw line to the latest connection
    pub async fn send_raw(&self, line: &str) {
        let mut guard = self.current.lock().await;
        let writer = guard.as_mut().expect("No client connected");
        writer.write_all(line.as_bytes()).await.expect("Write failed");
        writer.write_all(b"\n").await.expect("Write failed");
        writer.flush().await.expect("Flush failed");
    }

    /// Next message from the client, or `None` after `wait`
    pub async fn recv_within(&mut self, wait: Duration) -> Option<Message> {
        tokio::time::timeout(wait, self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next message from the client; panics after two seconds
    pub async fn recv(&mut self) -> Message {
        self.recv_within(Duration::from_secs(2))
            .await
            .expect("Timed out waiting for client message")
    }

    /// Wait until a client has connected
    pub async fn wait_for_client(&self) {
        for _ in 0..200 {
            if self.current.lock().await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("No client connected to fake daemon");
    }

    /// Stop listening and hang up on the current client
    pub async fn stop(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;
        if let Some(mut writer) = self.current.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Config pointing at `path` with short timings for tests
pub fn test_config(path: &Path) -> ClientConfig {
    let mut config = ClientConfig::with_socket_path(path);
    config.debounce = Duration::from_millis(50);
    config.write_timeout = Duration::from_millis(500);
    config.read_timeout = Duration::from_secs(10);
    config.connect_timeout = Duration::from_millis(500);
    config.reconnect = ReconnectConfig {
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(1),
        max_retries: 10,
        multiplier: 2.0,
        jitter: 0.0,
    };
    config
}

/// Notification callback that records every call
pub fn recording_notifier() -> (NotifyCallback, Arc<Mutex<Vec<(NotifyLevel, String)>>>) {
    let seen: Arc<Mutex<Vec<(NotifyLevel, String)>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let callback: NotifyCallback = Arc::new(move |level, message: &str| {
        sink.lock().unwrap().push((level, message.to_string()));
    });
    (callback, seen)
}
