//! Chat Bridge
//!
//! Exposes a line-oriented TCP chat server to stateless HTTP clients.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────────┐
//!                        │                   CHAT BRIDGE                     │
//!                        │                                                   │
//!   POST /api/login      │  ┌────────┐    ┌──────────┐    ┌──────────────┐  │
//!   ─────────────────────┼─▶│  http  │───▶│ dispatch │───▶│   session    │  │
//!                        │  │ server │    │          │    │   registry   │  │
//!                        │  └────────┘    └──────────┘    └──────┬───────┘  │
//!                        │                                       │ one per  │
//!                        │                                       ▼ username │
//!   JSON reply           │  ┌────────┐    ┌──────────┐    ┌──────────────┐  │
//!   ◀────────────────────┼──│response│◀───│ pending  │◀───│   session    │◀─┼──── Chat
//!                        │  │        │    │ (FIFO)   │    │    actor     │  │     Server
//!                        │  └────────┘    └──────────┘    └──────────────┘  │     (TCP)
//!                        │                                                   │
//!                        │  config · observability · lifecycle · admin       │
//!                        └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use chat_bridge::config::{load_config, validate_config, BridgeConfig, ConfigError};
use chat_bridge::lifecycle::{self, signals, Shutdown};
use chat_bridge::observability::logging;

#[derive(Parser)]
#[command(name = "chat-bridge")]
#[command(about = "HTTP bridge to a line-oriented TCP chat server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    bind: Option<String>,

    /// Override the chat server address
    #[arg(long)]
    backend: Option<String>,
}

fn resolve_config(args: Args) -> Result<BridgeConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(backend) = args.backend {
        config.backend.address = backend;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(Args::parse())?;
    logging::init_logging(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "chat-bridge starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        request_timeout_secs = config.timeouts.request_secs,
        admin_enabled = config.admin.enabled,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    lifecycle::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
