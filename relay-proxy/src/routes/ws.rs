//! WebSocket chat endpoint.
//!
//! Each connection runs two halves: this handler reads frames and reacts,
//! while a writer task drains the connection's outbound channel from the
//! [`ConnectionRegistry`](relay_core::ConnectionRegistry) into the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use relay_core::realtime::{CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION};
use relay_core::OutboundMessage;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Close code sent to connections when the server stops
const CLOSE_GOING_AWAY: u16 = 1001;

/// How long the writer may take to flush queued frames once the reader is done
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Upgrade to a WebSocket bound to `client_id`
///
/// GET /api/v1/ws/:client_id?token=...
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id, params.token))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, client_id: String, token: Option<String>) {
    // The token is optional; one that is present must be valid. The path
    // identity is not bound to the token subject, only logged when they differ.
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        match state.verifier.verify(&token) {
            Ok(subject) if subject != client_id => {
                info!(client_id = %client_id, subject = %subject, "Token subject differs from client id");
            }
            Ok(_) => {}
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Rejecting WebSocket with invalid token");
                let frame = close_frame(CLOSE_POLICY_VIOLATION, "Invalid token".to_string());
                let _ = socket.send(frame).await;
                return;
            }
        }
    }

    let (conn_id, outbound) = state.connections.connect(&client_id);
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_outbound(sink, outbound));
    let mut writer_done = false;

    loop {
        let frame = tokio::select! {
            result = &mut writer => {
                // Pruned by the registry or the peer stopped accepting frames
                writer_done = true;
                if let Err(e) = result {
                    warn!(client_id = %client_id, error = %e, "WebSocket writer ended abnormally");
                }
                break;
            }
            _ = state.shutdown.cancelled() => {
                let _ = state.connections.send_to_connection(
                    &client_id,
                    conn_id,
                    OutboundMessage::close(CLOSE_GOING_AWAY, "Server shutting down"),
                );
                break;
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                info!(client_id = %client_id, "Message received");

                let ack = OutboundMessage::text(format!("You wrote: {}", text));
                if let Err(e) = state.connections.send_to_connection(&client_id, conn_id, ack) {
                    debug!(client_id = %client_id, error = %e, "Connection gone before ack");
                    break;
                }

                let annotated = OutboundMessage::text(format!("Client {} says: {}", client_id, text));
                state.connections.broadcast(&annotated, Some(&client_id));
            }
            Some(Ok(Message::Close(_))) | None => break,
            // Ping, pong and binary frames carry no chat content
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(client_id = %client_id, error = %e, "WebSocket error");
                let _ = state.connections.send_to_connection(
                    &client_id,
                    conn_id,
                    OutboundMessage::close(CLOSE_INTERNAL_ERROR, "Internal server error"),
                );
                break;
            }
        }
    }

    // Dropping the registry entry closes the outbound channel, so the writer
    // flushes what is queued and exits
    state.connections.disconnect(&client_id, conn_id);
    if !writer_done {
        match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(client_id = %client_id, error = %e, "WebSocket writer ended abnormally"),
            Err(_) => {
                // Peer is not reading; dropping the socket halves closes it
                warn!(client_id = %client_id, "WebSocket writer stalled, dropping connection");
                writer.abort();
            }
        }
    }

    if !state.shutdown.is_cancelled() {
        let notice = OutboundMessage::text(format!("Client {} left the chat", client_id));
        state.connections.broadcast(&notice, None);
    }
}

async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let (frame, closing) = match message {
            OutboundMessage::Text(text) => (Message::Text(text), false),
            OutboundMessage::Close { code, reason } => (close_frame(code, reason), true),
        };

        if sink.send(frame).await.is_err() || closing {
            break;
        }
    }
    let _ = sink.close().await;
}

fn close_frame(code: u16, reason: String) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}
