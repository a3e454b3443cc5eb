//! Completion backends available to the server.

mod echo;

pub use echo::EchoProvider;

use std::sync::Arc;

use relay_adapter_ollama::OllamaProvider;
use relay_core::ProviderRegistry;
use tracing::{info, warn};

use crate::config::{ProviderKind, ServerConfig};

/// Build the model routing table for the configured backend.
///
/// `echo` is always available under its own name. With the echo backend the
/// default model is its only other name; with Ollama every other model name
/// is passed through to the Ollama server.
pub async fn build_registry(config: &ServerConfig) -> anyhow::Result<ProviderRegistry> {
    let echo = Arc::new(EchoProvider);
    let registry = ProviderRegistry::new().with_model("echo", echo.clone());

    let registry = match config.provider {
        ProviderKind::Echo => registry.with_model(config.default_model.clone(), echo),
        ProviderKind::Ollama => {
            let ollama = Arc::new(OllamaProvider::new(config.ollama.clone())?);

            match ollama.health_check().await {
                Ok(()) => info!(url = %ollama.base_url(), "Connected to Ollama"),
                Err(e) => warn!(
                    url = %ollama.base_url(),
                    error = %e,
                    "Could not connect to Ollama. Server will start anyway and retry on requests."
                ),
            }

            registry
                .with_model(config.default_model.clone(), ollama.clone())
                .with_fallback(ollama)
        }
    };

    info!(
        provider = ?config.provider,
        default_model = %config.default_model,
        models = ?registry.models(),
        "Completion providers ready"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_registry_routes_default_model() {
        let registry = build_registry(&ServerConfig::default()).await.unwrap();

        assert_eq!(registry.resolve("you").unwrap().name(), "echo");
        assert_eq!(registry.resolve("echo").unwrap().name(), "echo");
        assert!(registry.resolve("llama3.2").is_err());
    }
}
