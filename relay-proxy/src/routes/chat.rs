//! Chat completion endpoints.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use futures::{stream, Stream, StreamExt};
use relay_core::CompletionStream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for both chat endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,

    /// Falls back to the configured default model
    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub cached: bool,
}

fn validate(state: &AppState, request: &ChatRequest) -> Result<String, ApiError> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::InvalidRequest("prompt must not be empty".to_string()));
    }
    Ok(request
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.config.default_model.clone()))
}

/// Synchronous chat completion
///
/// POST /api/v1/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.stream {
        return Err(ApiError::InvalidRequest(
            "For streaming responses, use the /api/v1/chat/stream endpoint".to_string(),
        ));
    }
    let model = validate(&state, &request)?;
    debug!(model = %model, "Handling POST /api/v1/chat");

    let completion = state.pipeline.complete(&request.prompt, &model).await?;

    Ok(Json(ChatResponse {
        text: completion.text,
        model: completion.model,
        cached: completion.cached,
    }))
}

/// Streaming chat completion as server-sent events
///
/// POST /api/v1/chat/stream
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let model = validate(&state, &request)?;
    debug!(model = %model, "Handling POST /api/v1/chat/stream");

    let chunks = state.pipeline.stream(&request.prompt, &model).await?;

    Ok(Sse::new(to_sse(chunks))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
        .into_response())
}

/// One `{"content": ...}` event per chunk, then the `[DONE]` marker.
///
/// A failing chunk becomes a single `error` event and ends the content.
fn to_sse(chunks: CompletionStream) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    chunks
        .scan(false, |failed, chunk| {
            if *failed {
                return futures::future::ready(None);
            }
            let event = match chunk {
                Ok(content) => Event::default().data(json!({ "content": content }).to_string()),
                Err(e) => {
                    error!(error = %e, "Completion stream failed");
                    *failed = true;
                    Event::default()
                        .event("error")
                        .data(json!({ "error": "generation_failed" }).to_string())
                }
            };
            futures::future::ready(Some(Ok::<_, Infallible>(event)))
        })
        .chain(stream::once(async {
            // Send [DONE] marker at the end
            Ok(Event::default().data("[DONE]"))
        }))
}
