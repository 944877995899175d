//! Daemon reachability check

use std::time::Duration;

use anyhow::Result;

use crate::output::{print_info, print_success};
use tb_client::{ClientConfig, NotifyClient, NotifyError};

/// Dial the daemon once and report whether it answered
pub async fn ping_command(config: ClientConfig, timeout: Duration) -> Result<()> {
    let socket = config.socket_path.clone();
    let client = NotifyClient::new(config)?;

    match client.connect(timeout).await {
        Ok(()) => {
            client.close().await;
            print_success(&format!("Taskboard daemon is reachable at {}", socket.display()));
            Ok(())
        }
        Err(NotifyError::Daemon(e)) => {
            print_info(&format!("Hint: {}", e.hint()));
            Err(e.into())
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to reach daemon at {}", socket.display()))),
    }
}
