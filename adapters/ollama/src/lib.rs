//! Ollama backend for relay completions.
//!
//! Generation goes through `POST /api/generate`; streamed responses are
//! newline-delimited JSON objects, each carrying a fragment of the answer.
//!
//! Reference: https://github.com/ollama/ollama/blob/main/docs/api.md

use std::env;
use std::time::Duration;

mod client;
mod ndjson;
pub mod types;

pub use client::OllamaProvider;
pub use ndjson::decode_stream;

/// Default Ollama port
const DEFAULT_PORT: u16 = 11434;

/// Connection settings for an Ollama server
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    /// Base URL, without trailing slash
    pub base_url: String,

    /// Per-request timeout; generations can be long
    pub timeout: Duration,

    /// How long Ollama keeps the model loaded after a request
    pub keep_alive: Option<String>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: format!("http://localhost:{}", DEFAULT_PORT),
            timeout: Duration::from_secs(300), // 5 min for long generations
            keep_alive: None,
        }
    }
}

impl OllamaConfig {
    /// Read configuration from environment variables
    ///
    /// `OLLAMA_URL` wins over `OLLAMA_HOST`; the latter follows Ollama's own
    /// convention and may omit the scheme and port.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = env::var("OLLAMA_URL")
            .ok()
            .or_else(|| env::var("OLLAMA_HOST").ok())
        {
            config.base_url = normalize_host(&url);
        }

        if let Some(secs) = env::var("RELAY_OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.timeout = Duration::from_secs(secs);
        }

        config.keep_alive = env::var("OLLAMA_KEEP_ALIVE").ok();
        config
    }
}

/// Turn `host`, `host:port` or a full URL into a base URL
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let (scheme, rest) = match host.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", host),
    };

    if rest.contains(':') {
        format!("{}://{}", scheme, rest)
    } else {
        format!("{}://{}:{}", scheme, rest, DEFAULT_PORT)
    }
}
