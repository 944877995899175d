//! Watch live change events

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::output::{
    describe_state, format_event, format_event_json, print_info, print_notification,
};
use tb_client::{ClientConfig, ConnectionState, NotifyClient, ScopeId};

/// Print admitted events until `cancel` fires or the session gives up
pub async fn listen_command(
    config: ClientConfig,
    scope: Option<ScopeId>,
    json: bool,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let client = NotifyClient::with_notifier(config, Arc::new(print_notification))?;

    client
        .connect(timeout)
        .await
        .context("Failed to connect to taskboard daemon")?;

    if let Some(scope) = scope {
        client
            .subscribe(scope)
            .await
            .with_context(|| format!("Failed to subscribe to {}", scope))?;
    }

    print_info(&format!(
        "Listening for changes on {} (Ctrl+C to stop)",
        client.current_scope()
    ));

    let mut events = client.listen_until(cancel)?;
    while let Some(event) = events.next().await {
        if json {
            println!("{}", format_event_json(&event)?);
        } else {
            println!("{}", format_event(&event));
        }
    }

    let state = client.state();
    client.close().await;

    if state == ConnectionState::Terminated {
        anyhow::bail!(describe_state(state));
    }

    tracing::debug!(last_sequence = client.last_sequence(), "Listener stopped");
    Ok(())
}
