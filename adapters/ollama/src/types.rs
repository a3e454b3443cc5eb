//! Ollama API types for `POST /api/generate`.
//!
//! Based on the official Ollama API documentation:
//! https://github.com/ollama/ollama/blob/main/docs/api.md

use serde::{Deserialize, Serialize};

/// Request body for POST /api/generate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model name (required)
    pub model: String,

    /// The prompt to generate a response for
    pub prompt: String,

    /// Enable streaming (Ollama defaults to true)
    pub stream: bool,

    /// How long to keep model loaded (e.g., "5m", "1h")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}

/// One object from /api/generate: the whole answer when not streaming,
/// otherwise one NDJSON line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Model name
    #[serde(default)]
    pub model: String,

    /// Generated text (streaming: partial, final: complete)
    #[serde(default)]
    pub response: String,

    /// Whether generation is complete
    #[serde(default)]
    pub done: bool,

    /// Reason for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,

    /// Number of tokens in the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,

    /// Error reported mid-stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
