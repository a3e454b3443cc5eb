//! Error types for the relay HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use relay_core::{AuthError, PipelineError, QueueError, RateLimitDecision};
use serde_json::json;

use crate::middleware::rate_limit::apply_rate_limit_headers;

/// Errors returned to HTTP clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Token failed verification
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Client exhausted its bucket
    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("Queue is stopped")]
    QueueStopped,

    #[error("Queue is full (max: {max})")]
    QueueFull { max: usize },

    /// Backend failure; the detail is logged, never returned
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Request parsing error
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidToken(_) => "invalid_token",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::QueueStopped => "queue_stopped",
            ApiError::QueueFull { .. } => "queue_full",
            ApiError::GenerationFailed(_) => "generation_failed",
            ApiError::UnknownModel(_) => "unknown_model",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::QueueStopped | ApiError::QueueFull { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::UnknownModel(_) | ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients
    fn public_message(&self) -> String {
        match self {
            ApiError::GenerationFailed(detail) => {
                tracing::error!(error = %detail, "Generation failed");
                "The completion backend failed to generate a response".to_string()
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::GenerationFailed(msg) => ApiError::GenerationFailed(msg),
            PipelineError::UnknownModel(model) => ApiError::UnknownModel(model),
            PipelineError::Queue(QueueError::Stopped) => ApiError::QueueStopped,
            PipelineError::Queue(QueueError::Full { max }) => ApiError::QueueFull { max },
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken(msg) => ApiError::InvalidToken(msg),
            AuthError::Issuance(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = json!({
            "type": self.kind(),
            "message": self.public_message(),
        });

        let decision = match &self {
            ApiError::RateLimited(decision) => {
                if let Some(retry_after) = decision.retry_after {
                    error["retry_after"] = json!(retry_after.as_secs_f64().ceil() as u64);
                }
                Some(decision.clone())
            }
            _ => None,
        };

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let Some(decision) = decision {
            apply_rate_limit_headers(response.headers_mut(), &decision);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidToken("x".into()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::QueueStopped.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::QueueFull { max: 1 }.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::GenerationFailed("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::UnknownModel("x".into()).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_pipeline_error_conversion() {
        let err: ApiError = PipelineError::Queue(QueueError::Stopped).into();
        assert!(matches!(err, ApiError::QueueStopped));

        let err: ApiError = PipelineError::GenerationFailed("boom".into()).into();
        assert_eq!(err.kind(), "generation_failed");
    }

    #[test]
    fn test_generation_failure_is_redacted() {
        let err = ApiError::GenerationFailed("upstream said: secret-key-123 invalid".into());
        assert!(!err.public_message().contains("secret-key-123"));
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 10,
            remaining: 0,
            reset_at: 1_700_000_120,
            retry_after: Some(Duration::from_millis(11_500)),
        };

        let response = ApiError::RateLimited(decision).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers["x-ratelimit-limit"], "10");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1700000120");
        assert_eq!(headers["retry-after"], "12");
    }
}
