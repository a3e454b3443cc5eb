//! Completion backends and model-to-backend routing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ProviderError;

/// Stream of generated text chunks
pub type CompletionStream = BoxStream<'static, Result<String, ProviderError>>;

/// A text completion backend.
///
/// Implementations may fail at any time; retries, if any, belong inside the
/// implementation.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short backend name for logs and stats
    fn name(&self) -> &str;

    /// Generate the full completion for `prompt`
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ProviderError>;

    /// Generate the completion as a sequence of chunks
    async fn complete_stream(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<CompletionStream, ProviderError>;
}

/// Selects the backend serving a model.
///
/// Models bound explicitly win; anything else goes to the fallback backend
/// when one is set, and is rejected as unknown otherwise.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    models: HashMap<String, Arc<dyn CompletionProvider>>,
    fallback: Option<Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `model` to `provider`
    pub fn with_model(mut self, model: impl Into<String>, provider: Arc<dyn CompletionProvider>) -> Self {
        self.models.insert(model.into(), provider);
        self
    }

    /// Serve every unbound model with `provider`
    pub fn with_fallback(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Backend for `model`
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn CompletionProvider>, ProviderError> {
        self.models
            .get(model)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| ProviderError::UnknownModel(model.to_string()))
    }

    /// Explicitly bound model names, sorted
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.models.keys().cloned().collect();
        models.sort();
        models
    }
}
