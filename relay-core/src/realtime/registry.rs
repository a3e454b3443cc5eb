//! Connection registry with direct send and best-effort fan-out.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Close code sent when a client fails authentication (policy violation)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code sent when the server hits an unexpected error
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Frames buffered per connection before it counts as unresponsive
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Identity of one live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A frame queued for delivery to one connection's writer
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Self::Close {
            code,
            reason: reason.into(),
        }
    }
}

/// The transport behind a connection is gone
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Connection {0} is closed")]
pub struct ConnectionClosed(pub ConnectionId);

type Outbox = mpsc::Sender<OutboundMessage>;

/// Why a frame could not be queued for a connection
#[derive(Debug, Clone, Copy)]
enum Undeliverable {
    /// The writer stopped draining and the outbox filled up
    Full,
    /// The writer is gone
    Closed,
}

impl Undeliverable {
    fn as_str(&self) -> &'static str {
        match self {
            Undeliverable::Full => "outbox full",
            Undeliverable::Closed => "transport closed",
        }
    }
}

fn offer(outbox: &Outbox, message: OutboundMessage) -> Result<(), Undeliverable> {
    outbox.try_send(message).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => Undeliverable::Full,
        mpsc::error::TrySendError::Closed(_) => Undeliverable::Closed,
    })
}

/// Point-in-time registry counters
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub clients: usize,
    pub connections: usize,
    pub messages_sent: u64,
    pub send_failures: u64,
}

/// Live connections keyed by client identity.
///
/// Each connection is represented by the sending half of its bounded
/// outbound channel; the task owning the socket drains the receiving half.
/// A connection whose outbox is full or closed is pruned. A client key is
/// present only while it has at least one connection.
///
/// All operations are synchronous and never hold a map guard across an
/// await point.
pub struct ConnectionRegistry {
    clients: DashMap<String, HashMap<ConnectionId, Outbox>>,
    outbox_capacity: usize,
    messages_sent: AtomicU64,
    send_failures: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::with_outbox_capacity(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose connections buffer at most `capacity` undelivered frames
    pub fn with_outbox_capacity(capacity: usize) -> Self {
        Self {
            clients: DashMap::new(),
            outbox_capacity: capacity.max(1),
            messages_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
        }
    }

    /// Register a new connection for `client_id` and return its outbound receiver
    pub fn connect(&self, client_id: &str) -> (ConnectionId, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let id = ConnectionId::new();
        self.register(client_id, id, tx);
        (id, rx)
    }

    /// Register an existing outbound channel under `client_id`
    pub fn register(&self, client_id: &str, id: ConnectionId, outbox: Outbox) {
        let devices = {
            let mut entry = self.clients.entry(client_id.to_string()).or_default();
            entry.insert(id, outbox);
            entry.len()
        };

        tracing::info!(
            client_id,
            connection_id = %id,
            devices,
            connections = self.connection_count(),
            "Client connected"
        );
    }

    /// Remove a connection. Returns whether it was registered; removing an
    /// unknown connection is a no-op.
    pub fn disconnect(&self, client_id: &str, id: ConnectionId) -> bool {
        let removed = match self.clients.get_mut(client_id) {
            Some(mut entry) => entry.remove(&id).is_some(),
            None => false,
        };
        self.clients.remove_if(client_id, |_, conns| conns.is_empty());

        if removed {
            tracing::info!(
                client_id,
                connection_id = %id,
                connections = self.connection_count(),
                "Client disconnected"
            );
        }
        removed
    }

    /// Deliver to exactly one connection.
    ///
    /// A connection whose transport is gone, or whose outbox is full, is
    /// removed before the error is returned.
    pub fn send_to_connection(
        &self,
        client_id: &str,
        id: ConnectionId,
        message: OutboundMessage,
    ) -> Result<(), ConnectionClosed> {
        let sent = match self.clients.get(client_id) {
            Some(conns) => match conns.get(&id) {
                Some(outbox) => offer(outbox, message),
                None => return Err(ConnectionClosed(id)),
            },
            None => return Err(ConnectionClosed(id)),
        };

        match sent {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(reason) => {
                self.settle(0, vec![(client_id.to_string(), id, reason)]);
                Err(ConnectionClosed(id))
            }
        }
    }

    /// Deliver to every connection of every client except `exclude`.
    ///
    /// Failures are logged and the dead connections pruned; returns the
    /// number of connections that accepted the message.
    pub fn broadcast(&self, message: &OutboundMessage, exclude: Option<&str>) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.clients.iter() {
            if exclude == Some(entry.key().as_str()) {
                continue;
            }
            for (id, outbox) in entry.value() {
                match offer(outbox, message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(reason) => dead.push((entry.key().clone(), *id, reason)),
                }
            }
        }

        self.settle(delivered, dead);
        delivered
    }

    /// Deliver to all connections of one client, best-effort
    pub fn send_to_client(&self, client_id: &str, message: &OutboundMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();

        if let Some(conns) = self.clients.get(client_id) {
            for (id, outbox) in conns.iter() {
                match offer(outbox, message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(reason) => dead.push((client_id.to_string(), *id, reason)),
                }
            }
        }

        self.settle(delivered, dead);
        delivered
    }

    /// Record a fan-out and prune the connections that could not take it.
    ///
    /// Removing a connection drops its sender, which ends the writer task
    /// and closes the socket.
    fn settle(&self, delivered: usize, dead: Vec<(String, ConnectionId, Undeliverable)>) {
        self.messages_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        self.send_failures.fetch_add(dead.len() as u64, Ordering::Relaxed);

        for (client_id, id, reason) in dead {
            tracing::warn!(
                client_id = %client_id,
                connection_id = %id,
                reason = reason.as_str(),
                "Dropping unreachable connection"
            );
            self.disconnect(&client_id, id);
        }
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.iter().map(|entry| entry.value().len()).sum()
    }

    /// Number of live connections for one client
    pub fn connections_for(&self, client_id: &str) -> usize {
        self.clients.get(client_id).map(|conns| conns.len()).unwrap_or(0)
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            clients: self.client_count(),
            connections: self.connection_count(),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }
}
