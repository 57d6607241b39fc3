//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all API handlers
//! - Wire up middleware (request ID, tracing, timeout, body limit, CORS)
//! - Bind server to listener and shut down gracefully
//! - Close backend sessions once the server stops

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware::map_response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::BridgeConfig;
use crate::dispatch::CommandDispatcher;
use crate::http::handlers;
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::http::response::timeout_envelope;
use crate::session::SessionRegistry;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: CommandDispatcher,
    pub config: Arc<BridgeConfig>,
}

impl AppState {
    /// Build the registry and dispatcher for a configuration.
    pub fn new(config: BridgeConfig) -> Self {
        let registry = SessionRegistry::new(config.backend.clone());
        let dispatcher = CommandDispatcher::new(registry, &config.backend);
        Self {
            dispatcher,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.dispatcher.registry()
    }
}

/// HTTP server for the chat bridge.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_state(AppState::new(config))
    }

    /// Create a server around existing state (shared with the admin API).
    pub fn with_state(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState) -> Router {
        let config = Arc::clone(&state.config);

        let router = Router::new()
            .route("/api/login", post(handlers::login))
            .route("/api/logout", post(handlers::logout))
            .route("/api/sendMessage", post(handlers::send_message))
            .route("/api/sendGroupMessage", post(handlers::send_group_message))
            .route("/api/createGroup", post(handlers::create_group))
            .route("/api/joinGroup", post(handlers::join_group))
            .route("/api/groups/{username}", get(handlers::get_groups))
            .route("/api/onlineUsers/{username}", get(handlers::get_online_users))
            .route("/health", get(handlers::health))
            .with_state(state)
            .layer(DefaultBodyLimit::max(config.http.max_body_size))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                    .layer(propagate_request_id_layer())
                    .layer(map_response(timeout_envelope))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            );

        if config.http.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Shared application state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server until `shutdown` fires, then close all backend sessions.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            backend = %self.state.config.backend.address,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        self.state.registry().close_all().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
