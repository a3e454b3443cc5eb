//! HTTP route handlers for the relay server.
//!
//! - `health`: liveness, readiness, health and stats
//! - `chat`: synchronous and streaming completions
//! - `ws`: real-time chat over WebSocket

pub mod chat;
pub mod health;
pub mod ws;

// Re-export handlers for convenience
pub use chat::{chat, chat_stream};
pub use health::{health, live, ready, stats};
pub use ws::ws_handler;
