//! HTTP surface tests driven through the router without a socket.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
};
use relay_core::rate_limit::BucketConfig;
use relay_proxy::{build_router, providers::build_registry, AppState, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn test_state(config: ServerConfig) -> Arc<AppState> {
    let providers = build_registry(&config).await.unwrap();
    Arc::new(AppState::new(config, providers))
}

async fn call(state: &Arc<AppState>, request: Request<Body>) -> Response {
    build_router(state.clone()).oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health_live_and_ready() {
    let state = test_state(ServerConfig::default()).await;

    let response = call(&state, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["queue"]["stopped"], false);
    assert_eq!(body["connections"], 0);

    assert_eq!(call(&state, get("/live")).await.status(), StatusCode::OK);
    assert_eq!(call(&state, get("/ready")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_second_identical_request_is_cached() {
    let state = test_state(ServerConfig::default()).await;

    let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "Hello" }))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-ratelimit-remaining"));
    let first = body_json(response).await;
    assert_eq!(first["text"], "Echo: Hello");
    assert_eq!(first["model"], "you");
    assert_eq!(first["cached"], false);

    let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "Hello", "model": "you" }))).await;
    let second = body_json(response).await;
    assert_eq!(second["text"], "Echo: Hello");
    assert_eq!(second["cached"], true);

    let stats = body_json(call(&state, get("/stats")).await).await;
    assert_eq!(stats["queue"]["tasks_completed"], 1);
}

#[tokio::test]
async fn test_chat_rejects_stream_flag() {
    let state = test_state(ServerConfig::default()).await;

    let response = call(
        &state,
        post_json("/api/v1/chat", json!({ "prompt": "Hello", "stream": true })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("/api/v1/chat/stream"));
}

#[tokio::test]
async fn test_chat_validation_errors() {
    let state = test_state(ServerConfig::default()).await;

    let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "  " }))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = call(
        &state,
        post_json("/api/v1/chat", json!({ "prompt": "Hi", "model": "gpt-9" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "unknown_model");
}

#[tokio::test]
async fn test_chat_stream_emits_chunks_then_done() {
    let state = test_state(ServerConfig::default()).await;

    let response = call(
        &state,
        post_json("/api/v1/chat/stream", json!({ "prompt": "Hello there" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/event-stream"
    );

    let body = body_text(response).await;
    assert!(body.contains(r#"data: {"content":"Echo: "}"#), "body: {}", body);
    assert!(body.contains(r#"data: {"content":"there"}"#), "body: {}", body);
    assert!(body.trim_end().ends_with("data: [DONE]"), "body: {}", body);
}

#[tokio::test]
async fn test_rate_limit_returns_429_with_headers() {
    let mut config = ServerConfig::default();
    config.rate_limit.api = BucketConfig::new(1, 2);
    let state = test_state(config).await;

    for _ in 0..2 {
        let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "Hi" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "Hi" }))).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "rate_limited");
    assert!(body["error"]["retry_after"].as_u64().unwrap() >= 1);

    // Health checks are never limited
    for _ in 0..5 {
        assert_eq!(call(&state, get("/health")).await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let mut config = ServerConfig::default();
    config.rate_limit.enabled = false;
    config.rate_limit.api = BucketConfig::new(1, 1);
    let state = test_state(config).await;

    for _ in 0..3 {
        let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "Hi" }))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }
}

#[tokio::test]
async fn test_not_ready_after_shutdown() {
    let state = test_state(ServerConfig::default()).await;
    state.shutdown().await;

    assert_eq!(
        call(&state, get("/ready")).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    let response = call(&state, post_json("/api/v1/chat", json!({ "prompt": "late" }))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "queue_stopped");
}
