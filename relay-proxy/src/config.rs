//! Server configuration.

use relay_adapter_ollama::OllamaConfig;
use relay_core::{CacheConfig, QueueConfig, RateLimitConfig};
use std::str::FromStr;

/// Secret used when `RELAY_JWT_SECRET` is unset. Development only.
pub const DEV_JWT_SECRET: &str = "relay-dev-secret-change-me";

/// Which completion backend serves the default model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Local deterministic backend
    Echo,
    /// Ollama server
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "echo" => Ok(ProviderKind::Echo),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider '{}', expected 'echo' or 'ollama'", other)),
        }
    }
}

/// Full configuration for the relay server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// HS256 secret for client tokens
    pub jwt_secret: String,

    /// Allowed CORS origins, empty means any
    pub cors_origins: Vec<String>,

    /// Backend for the default model
    pub provider: ProviderKind,

    /// Model name served when a request does not name one
    pub default_model: String,

    pub ollama: OllamaConfig,
    pub rate_limit: RateLimitConfig,
    pub queue: QueueConfig,
    pub cache: CacheConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            cors_origins: Vec::new(),
            provider: ProviderKind::Echo,
            default_model: "you".to_string(),
            ollama: OllamaConfig::default(),
            rate_limit: RateLimitConfig::default(),
            queue: QueueConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self {
            ollama: OllamaConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
            queue: QueueConfig::from_env(),
            cache: CacheConfig::from_env(),
            ..Self::default()
        };

        if let Ok(val) = std::env::var("RELAY_HOST") {
            config.host = val;
        }

        if let Ok(val) = std::env::var("RELAY_PORT") {
            config.port = val
                .parse()
                .map_err(|_| format!("RELAY_PORT is not a valid port: {}", val))?;
        }

        if let Ok(val) = std::env::var("RELAY_JWT_SECRET") {
            config.jwt_secret = val;
        }

        if let Ok(val) = std::env::var("RELAY_CORS_ORIGINS") {
            config.cors_origins = parse_list(&val);
        }

        if let Ok(val) = std::env::var("RELAY_PROVIDER") {
            config.provider = val.parse()?;
        }

        if let Ok(val) = std::env::var("RELAY_DEFAULT_MODEL") {
            config.default_model = val;
        }

        Ok(config)
    }

    /// Address to bind, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

fn parse_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "*")
        .map(String::from)
        .collect()
}
