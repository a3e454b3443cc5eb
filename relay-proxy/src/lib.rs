//! Relay server: HTTP and WebSocket front end over `relay-core`.
//!
//! ```text
//!                 ┌──────────────────── relay-proxy ────────────────────┐
//!  HTTP client ──►│ rate_limit ──► /api/v1/chat ────────► Pipeline ─────┼──► provider
//!                 │    middleware  /api/v1/chat/stream ─► (cache+queue) │
//!                 │                                                     │
//!  WS client  ◄──►│ /api/v1/ws/:client_id ◄──► ConnectionRegistry       │
//!                 └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Echo backend on port 8000
//! relay-proxy
//!
//! # Ollama backend with a shared secret for WebSocket tokens
//! RELAY_PROVIDER=ollama RELAY_JWT_SECRET=s3cret relay-proxy --port 9000
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod providers;
pub mod routes;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub use config::{ProviderKind, ServerConfig};
pub use error::ApiError;
pub use state::AppState;

/// Build the router with every route and middleware layer attached
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(routes::health))
        .route("/ready", get(routes::ready))
        .route("/live", get(routes::live))
        .route("/stats", get(routes::stats))
        // Completions
        .route("/api/v1/chat", post(routes::chat))
        .route("/api/v1/chat/stream", post(routes::chat_stream))
        // Real-time chat
        .route("/api/v1/ws/:client_id", get(routes::ws_handler))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Serve `state` on `listener` until `signal` resolves, then cancel live
/// WebSocket sessions and drain the request queue.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state.clone());
    let token = state.shutdown.clone();

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutdown signal received");
            // Upgraded sockets are not tracked by graceful shutdown
            token.cancel();
        })
        .await?;

    state.shutdown().await;
    Ok(())
}

/// Build every component from `config` and run until Ctrl+C
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!(
        host = %config.host,
        port = config.port,
        provider = ?config.provider,
        "Starting relay v{}",
        env!("CARGO_PKG_VERSION")
    );

    if config.uses_dev_secret() {
        warn!("RELAY_JWT_SECRET is not set, using the development secret");
    }

    let providers = providers::build_registry(&config).await?;
    info!(models = ?providers.models(), "Providers registered");

    let state = Arc::new(AppState::new(config, providers));
    let sweeper = state.spawn_cache_sweeper();

    let addr = state.config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!("Relay listening on http://{}", addr);
    info!("Chat:      http://{}/api/v1/chat", addr);
    info!("WebSocket: ws://{}/api/v1/ws/{{client_id}}", addr);
    info!("Health:    http://{}/health", addr);

    serve(listener, state, shutdown_signal()).await?;

    if let Err(e) = sweeper.await {
        warn!(error = %e, "Cache sweeper ended abnormally");
    }
    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
