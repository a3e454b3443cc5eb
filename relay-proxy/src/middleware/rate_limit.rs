//! Per-client rate limiting for HTTP routes.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use relay_core::RateLimitDecision;

use crate::error::ApiError;
use crate::state::AppState;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Middleware admitting or rejecting each request against its client's bucket
pub async fn rate_limit(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let config = state.rate_limiter.config();
    let path = request.uri().path();

    if !config.enabled || config.is_excluded(path) {
        return next.run(request).await;
    }

    let class = config.classify(path);
    let identity = client_identity(&request, config.trust_forwarded_for);
    let decision = state.rate_limiter.check(&identity, class).await;

    if !decision.allowed {
        tracing::info!(identity = %identity, %class, path, "Request throttled");
        return ApiError::RateLimited(decision).into_response();
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    response
}

/// Identity used for bucketing: the peer address.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` hop wins when
/// present. Otherwise the header is client-controlled and ignored.
pub fn client_identity(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write the `X-RateLimit-*` headers, plus `Retry-After` on denial
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(decision.reset_at));

    if let Some(retry_after) = decision.retry_after {
        let secs = (retry_after.as_secs_f64().ceil() as u64).max(1);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with(forwarded: Option<&str>, peer: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/api/v1/chat");
        if let Some(value) = forwarded {
            builder = builder.header("x-forwarded-for", value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_forwarded_header_ignored_by_default() {
        let request = request_with(Some("198.51.100.1"), Some("203.0.113.5:4000"));
        assert_eq!(client_identity(&request, false), "203.0.113.5");
    }

    #[test]
    fn test_trusted_proxy_uses_first_forwarded_hop() {
        let request = request_with(Some("203.0.113.7, 10.0.0.1"), Some("10.0.0.1:4000"));
        assert_eq!(client_identity(&request, true), "203.0.113.7");

        let request = request_with(Some("  "), Some("10.0.0.1:4000"));
        assert_eq!(client_identity(&request, true), "10.0.0.1");
    }

    #[test]
    fn test_identity_falls_back_to_peer() {
        let request = request_with(None, Some("192.0.2.4:5555"));
        assert_eq!(client_identity(&request, false), "192.0.2.4");

        let request = request_with(None, None);
        assert_eq!(client_identity(&request, false), "unknown");
    }

    #[test]
    fn test_success_headers_have_no_retry_after() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(
            &mut headers,
            &RateLimitDecision {
                allowed: true,
                limit: 50,
                remaining: 49,
                reset_at: 1_700_000_002,
                retry_after: None,
            },
        );

        assert_eq!(headers["x-ratelimit-remaining"], "49");
        assert!(headers.get(header::RETRY_AFTER).is_none());
    }
}
