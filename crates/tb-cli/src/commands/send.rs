//! Emit change notifications

use std::time::Duration;

use anyhow::{Context, Result};

use crate::output::{print_notification, print_success};
use tb_client::{ClientConfig, Event, NotifyClient, ScopeId};
use tb_core::time::current_time_millis;

/// Enqueue `count` change notifications for `scope`, then flush and close
pub async fn send_command(
    config: ClientConfig,
    scope: ScopeId,
    count: u32,
    timeout: Duration,
) -> Result<()> {
    let debounce = config.debounce;
    let client = NotifyClient::with_notifier(config, std::sync::Arc::new(print_notification))?;

    client
        .connect(timeout)
        .await
        .context("Failed to connect to taskboard daemon")?;

    for n in 0..count {
        client
            .send(Event::database_changed(scope, current_time_millis()))
            .await
            .with_context(|| format!("Failed to queue notification {}", n + 1))?;
    }

    // Let the current window close before the final flush
    tokio::time::sleep(debounce).await;
    client.close().await;

    print_success(&format!("Sent {} notification(s) for {}", count, scope));
    Ok(())
}
