//! tb-notify CLI
//!
//! Operator tool for taskboard live updates:
//! - Watch change events pushed by the daemon
//! - Emit change notifications as a writer would
//! - Check daemon reachability and manage client configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tb_cli::commands;
use tb_cli::output::print_error;
use tb_client::{ClientConfig, ScopeId};
use tb_core::config::SOCKET_ENV_VAR;

#[derive(Parser)]
#[command(name = "tb-notify")]
#[command(author, version, about = "Live-update notifications for the taskboard daemon")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Daemon socket path (overrides config)
    #[arg(short, long, global = true, env = SOCKET_ENV_VAR)]
    socket: Option<PathBuf>,

    /// Seconds to wait for the first connection
    #[arg(long, global = true, default_value_t = 5)]
    timeout: u64,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print change events as they arrive
    Listen {
        /// Only receive events for this scope
        #[arg(long)]
        scope: Option<i64>,
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Notify the daemon that a scope changed
    Send {
        /// Scope that changed (0 for every scope)
        #[arg(long)]
        scope: i64,
        /// Number of notifications to emit
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// Check that the daemon socket accepts connections
    Ping,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show effective configuration
    Show,
    /// Show config file path
    Path,
    /// Create default configuration
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path),
            ConfigAction::Path => commands::config_path(config_path),
            ConfigAction::Init { force } => commands::config_init(config_path, force),
        },
        Commands::Listen { scope, json } => {
            let config = load_config(config_path, cli.socket)?;
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            commands::listen_command(config, scope.map(ScopeId::new), json, timeout, cancel).await
        }
        Commands::Send { scope, count } => {
            let config = load_config(config_path, cli.socket)?;
            commands::send_command(config, ScopeId::new(scope), count, timeout).await
        }
        Commands::Ping => {
            let config = load_config(config_path, cli.socket)?;
            commands::ping_command(config, timeout).await
        }
    }
}

/// Load the client config and apply the socket override
fn load_config(path: Option<&std::path::Path>, socket: Option<PathBuf>) -> Result<ClientConfig> {
    let mut config = ClientConfig::load_or_default(path).context("Failed to load configuration")?;
    if let Some(socket) = socket {
        config.socket_path = socket;
    }
    tracing::debug!(socket = %config.socket_path.display(), "Using daemon socket");
    Ok(config)
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        cancel.cancel();
    });
}
