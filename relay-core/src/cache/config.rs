//! Configuration for the shared cache.

use std::time::Duration;

/// Configuration for the in-memory store and completion caching
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries held by the in-memory store
    pub capacity: usize,

    /// Time-to-live for cached completions
    pub completion_ttl: Duration,

    /// How often the sweeper drops expired entries
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            completion_ttl: Duration::from_secs(3600), // 1 hour
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RELAY_CACHE_CAPACITY") {
            if let Ok(n) = val.parse() {
                config.capacity = n;
            }
        }

        if let Ok(val) = std::env::var("RELAY_CACHE_TTL_SECS") {
            if let Ok(n) = val.parse() {
                config.completion_ttl = Duration::from_secs(n);
            }
        }

        if let Ok(val) = std::env::var("RELAY_CACHE_SWEEP_SECS") {
            if let Ok(n) = val.parse::<u64>() {
                config.sweep_interval = Duration::from_secs(n.max(1));
            }
        }

        config
    }
}
