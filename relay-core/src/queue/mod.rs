//! Async request queue decoupling submitters from slow work.
//!
//! # Architecture
//!
//! ```text
//!   submit(work) ──► TaskHandle (awaitable result)
//!        │
//!        ▼
//! ┌─────────────────┐
//! │  bounded mpsc   │ ← FIFO, max_size slots, submit waits when full
//! └────────┬────────┘
//!          │
//!    ┌─────┼─────┐
//!    ▼     ▼     ▼
//!  worker worker worker  ← fixed pool, one task each
//!    │
//!    └──► in-flight set, metrics, result hand-off
//! ```
//!
//! Each submission gets its own result channel; there is no shared table of
//! pending results to clean up.

mod config;
mod metrics;
#[allow(clippy::module_inception)]
mod queue;

pub use config::QueueConfig;
pub use metrics::{QueueMetrics, QueueStats};
pub use queue::{QueueError, RequestQueue, TaskError, TaskHandle, TaskId};
