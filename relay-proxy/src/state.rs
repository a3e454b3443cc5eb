//! Application state for the relay server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use relay_core::cache::{spawn_sweeper, Cache, MemoryStore};
use relay_core::{
    CompletionPipeline, ConnectionRegistry, IdentityVerifier, ProviderRegistry, RateLimiter,
    RequestQueue,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::JwtVerifier;
use crate::config::ServerConfig;

/// Application state shared across all handlers.
///
/// Every component is constructed here and torn down by
/// [`AppState::shutdown`]; nothing lives in a global.
pub struct AppState {
    /// Configuration
    pub config: ServerConfig,

    /// Token buckets per client and request class
    pub rate_limiter: RateLimiter,

    /// Live WebSocket connections
    pub connections: ConnectionRegistry,

    /// Cached, queued chat completions
    pub pipeline: CompletionPipeline,

    /// Verifies WebSocket tokens
    pub verifier: Arc<dyn IdentityVerifier>,

    /// Backing store of the completion cache
    pub store: Arc<MemoryStore>,

    /// Backing store of the rate limiter's buckets
    pub bucket_store: Arc<MemoryStore>,

    /// Fires when the server begins shutting down
    pub shutdown: CancellationToken,

    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build every component. Spawns the queue workers, so it must run
    /// inside a Tokio runtime.
    pub fn new(config: ServerConfig, providers: ProviderRegistry) -> Self {
        let (cache, store) = Cache::in_memory(&config.cache);
        let (rate_limiter, bucket_store) = RateLimiter::in_memory(config.rate_limit.clone());
        let queue = Arc::new(RequestQueue::start(config.queue.clone()));

        Self {
            rate_limiter,
            connections: ConnectionRegistry::new(),
            pipeline: CompletionPipeline::new(cache, queue, providers, config.cache.completion_ttl),
            verifier: Arc::new(JwtVerifier::new(&config.jwt_secret)),
            store,
            bucket_store,
            shutdown: CancellationToken::new(),
            started_at: Utc::now(),
            config,
        }
    }

    /// Start the periodic purge of expired completions and buckets
    pub fn spawn_cache_sweeper(&self) -> JoinHandle<()> {
        spawn_sweeper(
            vec![self.store.clone(), self.bucket_store.clone()],
            self.config.cache.sweep_interval,
            self.shutdown.child_token(),
        )
    }

    /// Signal shutdown to connections and background tasks, then drain the
    /// queue, letting in-flight completions finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.pipeline.queue().shutdown().await;
    }

    /// Whether the server still accepts completion work
    pub fn is_ready(&self) -> bool {
        !self.shutdown.is_cancelled() && !self.pipeline.queue().is_stopped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::build_registry;
    use relay_core::rate_limit::BucketConfig;
    use relay_core::LimitClass;

    const T0: f64 = 1_700_000_000.0;

    #[tokio::test]
    async fn test_completion_writes_do_not_evict_buckets() {
        let mut config = ServerConfig::default();
        config.cache.capacity = 2;
        config.rate_limit.api = BucketConfig::new(1, 1);
        let providers = build_registry(&config).await.unwrap();
        let state = AppState::new(config, providers);

        let limiter = &state.rate_limiter;
        assert!(limiter.check_at("203.0.113.5", LimitClass::Api, T0).await.allowed);
        assert!(!limiter.check_at("203.0.113.5", LimitClass::Api, T0).await.allowed);

        for prompt in ["first", "second", "third"] {
            state.pipeline.complete(prompt, "you").await.unwrap();
        }

        assert!(!limiter.check_at("203.0.113.5", LimitClass::Api, T0).await.allowed);
        assert_eq!(state.bucket_store.len().await, 1);
        assert_eq!(state.store.len().await, 2);
    }
}
