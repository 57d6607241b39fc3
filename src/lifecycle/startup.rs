//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Bind the API listener (and the admin listener when enabled)
//! - Run both servers until shutdown
//!
//! Any bind failure is fatal. The API listener is bound last so no
//! traffic arrives before the rest of the process is ready.

use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin;
use crate::config::BridgeConfig;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Run the bridge until `shutdown` fires.
pub async fn run(config: BridgeConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = AppState::new(config);

    let admin_task = if state.config.admin.enabled {
        let listener = bind(&state.config.admin.bind_address).await?;
        let admin_state = state.clone();
        let rx = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = admin::run_admin(admin_state, listener, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }))
    } else {
        None
    };

    let listener = bind(&state.config.listener.bind_address).await?;
    HttpServer::with_state(state)
        .run(listener, shutdown.subscribe())
        .await?;

    if let Some(task) = admin_task {
        let _ = task.await;
    }
    Ok(())
}
