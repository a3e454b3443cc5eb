//! Real-time messaging over long-lived client connections.
//!
//! ```text
//!   socket task (per connection)        ConnectionRegistry
//!   ┌──────────────────────────┐       ┌──────────────────────────────┐
//!   │ reader ── on message ────┼──────►│ client_id ─► { conn ─► tx }  │
//!   │ writer ◄── outbound rx ◄─┼───────│ send / send_to_client /      │
//!   └──────────────────────────┘       │ broadcast(exclude)           │
//!                                      └──────────────────────────────┘
//! ```
//!
//! The registry never touches sockets. Delivery means pushing onto a
//! connection's bounded outbound channel. A closed channel is how a dead
//! transport shows up and a full one is how a peer that stopped reading
//! shows up; either way the connection is removed on the spot.

mod registry;

pub use registry::{
    ConnectionClosed, ConnectionId, ConnectionRegistry, OutboundMessage, RegistryStats,
    CLOSE_INTERNAL_ERROR, CLOSE_POLICY_VIOLATION, DEFAULT_OUTBOX_CAPACITY,
};
