//! Health check and stats endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let queue = state.pipeline.queue();
    let status = if state.is_ready() { "healthy" } else { "shutting_down" };

    Json(json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "connections": state.connections.connection_count(),
        "queue": {
            "pending": queue.pending(),
            "in_flight": queue.in_flight().await,
            "max_size": queue.max_size(),
            "stopped": queue.is_stopped()
        }
    }))
}

/// Counters for every core component
///
/// GET /stats
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "started_at": state.started_at.to_rfc3339(),
        "queue": state.pipeline.queue().stats(),
        "cache": {
            "entries": state.store.len().await,
            "completion_ttl_secs": state.config.cache.completion_ttl.as_secs(),
            "counters": state.pipeline.cache().stats()
        },
        "rate_limit": {
            "buckets": state.bucket_store.len().await,
            "counters": state.rate_limiter.stats()
        },
        "realtime": state.connections.stats()
    }))
}

/// Ready check (for Kubernetes)
///
/// GET /ready
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Live check (for Kubernetes)
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}
