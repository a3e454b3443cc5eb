//! Relay core library
//!
//! Shared building blocks of the relay backend-for-frontend:
//!
//! - [`cache`]: key-value store contract, in-memory LRU store, typed cache
//! - [`rate_limit`]: token-bucket admission per client and request class
//! - [`realtime`]: registry of live client connections with fan-out
//! - [`queue`]: bounded FIFO queue drained by a worker pool
//! - [`pipeline`]: cache-or-compute completions over the queue
//! - [`provider`]: completion backend capability and model routing
//!
//! Nothing here speaks HTTP; the proxy crate wires these into routes.

pub mod auth;
pub mod cache;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod queue;
pub mod rate_limit;
pub mod realtime;

pub use auth::IdentityVerifier;
pub use cache::{Cache, CacheConfig, KeyValueStore, MemoryStore};
pub use error::{AuthError, PipelineError, ProviderError, StoreError};
pub use pipeline::{Completion, CompletionPipeline};
pub use provider::{CompletionProvider, CompletionStream, ProviderRegistry};
pub use queue::{QueueConfig, QueueError, RequestQueue, TaskError, TaskHandle, TaskId};
pub use rate_limit::{LimitClass, RateLimitConfig, RateLimitDecision, RateLimiter};
pub use realtime::{ConnectionClosed, ConnectionId, ConnectionRegistry, OutboundMessage};
