//! Cache-or-compute orchestration for chat completions.
//!
//! ```text
//!   complete(prompt, model)
//!        │
//!        ▼
//!   Cache.get(completion key) ── hit ──► return (cached = true)
//!        │ miss / store error
//!        ▼
//!   RequestQueue.submit(provider.complete) ──► await TaskHandle
//!        │ Ok(text)                    │ Err
//!        ▼                             ▼
//!   Cache.set(key, text, ttl)     GenerationFailed (not cached),
//!        │                        or Queue(Stopped) if dropped at shutdown
//!        │
//!        ▼
//!   return (cached = false)
//! ```
//!
//! Concurrent misses for the same key are not collapsed: each one reaches
//! the provider.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::instrument;

use crate::cache::{completion_key, Cache};
use crate::error::PipelineError;
use crate::provider::{CompletionStream, ProviderRegistry};
use crate::queue::{QueueError, RequestQueue, TaskError};

/// A completed generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    /// Served from cache without calling the provider
    pub cached: bool,
}

pub struct CompletionPipeline {
    cache: Cache,
    queue: Arc<RequestQueue>,
    providers: ProviderRegistry,
    ttl: Duration,
}

impl CompletionPipeline {
    pub fn new(cache: Cache, queue: Arc<RequestQueue>, providers: ProviderRegistry, ttl: Duration) -> Self {
        Self {
            cache,
            queue,
            providers,
            ttl,
        }
    }

    /// Return the cached completion for `(prompt, model)`, or generate,
    /// cache and return it.
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    pub async fn complete(&self, prompt: &str, model: &str) -> Result<Completion, PipelineError> {
        let key = completion_key(prompt, model);

        match self.cache.get::<String>(&key).await {
            Ok(Some(text)) => {
                tracing::debug!("Completion cache hit");
                return Ok(Completion {
                    text,
                    model: model.to_string(),
                    cached: true,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Completion cache unavailable, treating as miss"),
        }

        let provider = self.providers.resolve(model)?;
        let (owned_prompt, owned_model) = (prompt.to_string(), model.to_string());

        let handle = self
            .queue
            .submit(async move { provider.complete(&owned_prompt, &owned_model).await })
            .await?;
        let task_id = handle.id();

        let text = match handle.await {
            Ok(text) => text,
            Err(TaskError::Failed(e)) => {
                tracing::warn!(%task_id, error = %e, "Generation failed");
                return Err(e.into());
            }
            Err(TaskError::Dropped) => {
                tracing::warn!(%task_id, "Queue stopped before generation started");
                return Err(PipelineError::Queue(QueueError::Stopped));
            }
            Err(e) => {
                tracing::warn!(%task_id, error = %e, "Generation did not complete");
                return Err(PipelineError::GenerationFailed(e.to_string()));
            }
        };

        if let Err(e) = self.cache.set(&key, &text, self.ttl).await {
            tracing::warn!(error = %e, "Failed to cache completion");
        }

        Ok(Completion {
            text,
            model: model.to_string(),
            cached: false,
        })
    }

    /// Stream a completion straight from the provider.
    ///
    /// Streams bypass the queue and the cache.
    pub async fn stream(&self, prompt: &str, model: &str) -> Result<CompletionStream, PipelineError> {
        let provider = self.providers.resolve(model)?;
        tracing::debug!(provider = provider.name(), "Starting completion stream");
        Ok(provider.complete_stream(prompt, model).await?)
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}
