//! Error types for the relay core library
//!
//! This module provides structured error types using `thiserror` for
//! type-safe error handling across the library.
//!
//! # Error Hierarchy
//!
//! ```text
//! StoreError        - Key-value store failures (unreachable, bad payload)
//! ProviderError     - Completion backend failures
//! AuthError         - Identity verification failures
//! PipelineError     - Cache-or-compute orchestration
//! ├── GenerationFailed  (wraps ProviderError text)
//! ├── UnknownModel
//! └── Queue(QueueError) (QueueStopped / QueueFull)
//! ```
//!
//! Queue and connection errors live next to their components:
//! [`crate::queue::QueueError`], [`crate::queue::TaskError`] and
//! [`crate::realtime::ConnectionClosed`].

use thiserror::Error;

use crate::queue::QueueError;

/// Errors raised by a [`crate::cache::KeyValueStore`] backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be encoded or decoded
    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Create an unavailable-store error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised by a completion backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// No backend is bound to the requested model
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Could not reach the backend
    #[error("Backend connection failed: {0}")]
    Connection(String),

    /// Backend answered with an error
    #[error("Backend error: {0}")]
    Backend(String),

    /// Backend answered with something we could not parse
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}

/// Errors raised while verifying a client token
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Token failed signature, expiry or claim checks
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token could not be issued
    #[error("Token issuance failed: {0}")]
    Issuance(String),
}

/// Errors surfaced by [`crate::pipeline::CompletionPipeline`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The backend failed; carries the original message
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// No backend serves the requested model
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// The request queue refused the work
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownModel(model) => Self::UnknownModel(model),
            other => Self::GenerationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::backend("model crashed");
        assert_eq!(err.to_string(), "Backend error: model crashed");

        let err = ProviderError::connection("refused");
        assert_eq!(err.to_string(), "Backend connection failed: refused");
    }

    #[test]
    fn test_pipeline_error_from_provider() {
        let err: PipelineError = ProviderError::backend("boom").into();
        assert_eq!(err, PipelineError::GenerationFailed("Backend error: boom".to_string()));

        let err: PipelineError = ProviderError::UnknownModel("gpt-9".to_string()).into();
        assert!(matches!(err, PipelineError::UnknownModel(m) if m == "gpt-9"));
    }

    #[test]
    fn test_pipeline_error_from_queue() {
        let err: PipelineError = QueueError::Stopped.into();
        assert_eq!(err.to_string(), "Queue is stopped");
    }

    #[test]
    fn test_store_error_from_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: StoreError = json_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
