//! Completion backend talking to an Ollama server.

use async_trait::async_trait;
use reqwest::Client;
use relay_core::{CompletionProvider, CompletionStream, ProviderError};
use tracing::{debug, error, info, instrument};

use crate::ndjson::decode_stream;
use crate::types::{GenerateRequest, GenerateResponse};
use crate::OllamaConfig;

/// Ollama completion provider
#[derive(Clone)]
pub struct OllamaProvider {
    /// HTTP client
    client: Client,
    config: OllamaConfig,
}

impl OllamaProvider {
    /// Create a provider for the configured server
    pub fn new(config: OllamaConfig) -> Result<Self, ProviderError> {
        info!(url = %config.base_url, "Creating Ollama provider");

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Get the Ollama base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Check if Ollama is available
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), ProviderError> {
        let url = format!("{}/api/tags", self.config.base_url);
        debug!(url = %url, "Checking Ollama health");

        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Ollama is healthy");
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                error!(status = %status, body = %body, "Ollama returned error");
                Err(ProviderError::backend(format!("Ollama returned status {}: {}", status, body)))
            }
            Err(e) => {
                error!(error = %e, "Failed to connect to Ollama");
                Err(ProviderError::connection(e.to_string()))
            }
        }
    }

    fn request(&self, prompt: &str, model: &str, stream: bool) -> GenerateRequest {
        GenerateRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            stream,
            keep_alive: self.config.keep_alive.clone(),
        }
    }

    async fn send(&self, request: &GenerateRequest) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/api/generate", self.config.base_url);
        debug!(url = %url, stream = request.stream, "Sending generate request");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::backend(format!("Ollama returned status {}: {}", status, body)));
        }

        Ok(response)
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() {
        ProviderError::connection(e.to_string())
    } else {
        ProviderError::backend(e.to_string())
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, prompt), fields(model = %model))]
    async fn complete(&self, prompt: &str, model: &str) -> Result<String, ProviderError> {
        let response = self.send(&self.request(prompt, model, false)).await?;

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = result.error {
            return Err(ProviderError::backend(error));
        }

        debug!(tokens = ?result.eval_count, "Generate complete");
        Ok(result.response)
    }

    #[instrument(skip(self, prompt), fields(model = %model))]
    async fn complete_stream(
        &self,
        prompt: &str,
        model: &str,
    ) -> Result<CompletionStream, ProviderError> {
        let response = self.send(&self.request(prompt, model, true)).await?;
        Ok(decode_stream(Box::pin(response.bytes_stream())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use futures::StreamExt;
    use std::time::Duration;

    /// Serve a fake /api/generate that echoes the prompt
    async fn spawn_fake_ollama() -> String {
        async fn generate(Json(request): Json<GenerateRequest>) -> (StatusCode, String) {
            if request.model == "missing" {
                return (StatusCode::NOT_FOUND, r#"{"error":"model 'missing' not found"}"#.to_string());
            }
            if request.stream {
                let body = request
                    .prompt
                    .split(' ')
                    .map(|word| format!("{{\"response\":\"{} \",\"done\":false}}\n", word))
                    .chain(std::iter::once("{\"response\":\"\",\"done\":true}\n".to_string()))
                    .collect();
                (StatusCode::OK, body)
            } else {
                let body = serde_json::json!({
                    "model": request.model,
                    "response": format!("echo: {}", request.prompt),
                    "done": true,
                    "eval_count": 2
                });
                (StatusCode::OK, body.to_string())
            }
        }

        let app = Router::new().route("/api/generate", post(generate));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String) -> OllamaProvider {
        OllamaProvider::new(OllamaConfig {
            base_url,
            timeout: Duration::from_secs(5),
            keep_alive: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_complete() {
        let provider = provider(spawn_fake_ollama().await);
        let text = provider.complete("Hello", "llama3.2").await.unwrap();
        assert_eq!(text, "echo: Hello");
    }

    #[tokio::test]
    async fn test_complete_stream() {
        let provider = provider(spawn_fake_ollama().await);
        let chunks: Vec<String> = provider
            .complete_stream("a b c", "llama3.2")
            .await
            .unwrap()
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), "a b c ");
    }

    #[tokio::test]
    async fn test_backend_error_status() {
        let provider = provider(spawn_fake_ollama().await);
        let err = provider.complete("Hello", "missing").await.unwrap_err();
        assert!(matches!(err, ProviderError::Backend(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        // Port 9 (discard) is closed on test hosts
        let provider = provider("http://127.0.0.1:9".to_string());
        let err = provider.complete("Hello", "llama3.2").await.unwrap_err();
        assert!(matches!(err, ProviderError::Connection(_)));
        assert!(provider.health_check().await.is_err());
    }
}
