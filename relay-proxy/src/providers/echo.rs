//! Deterministic local completion backend.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use relay_core::{CompletionProvider, CompletionStream, ProviderError};

/// Answers every prompt by echoing it back.
///
/// Streaming yields the same text word by word, so the concatenated stream
/// equals the non-streaming answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoProvider;

impl EchoProvider {
    fn answer(prompt: &str) -> String {
        format!("Echo: {}", prompt)
    }
}

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &str, _model: &str) -> Result<String, ProviderError> {
        Ok(Self::answer(prompt))
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        _model: &str,
    ) -> Result<CompletionStream, ProviderError> {
        let chunks: Vec<Result<String, ProviderError>> = Self::answer(prompt)
            .split_inclusive(' ')
            .map(|word| Ok(word.to_string()))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}
