use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::error::RegistryError;
use super::types::{Connection, ConnectionCounts, ConnectionId, ConnectionRole, Direction};
use crate::constants::CONNECTION_EVENT_CAPACITY;
use crate::counter::{AccountingError, Gauge};

/// A change in the set of live connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(Connection),
    Disconnected(Connection),
    /// An outgoing connection attempt failed before the handshake finished.
    ConnectFailed {
        remote: SocketAddr,
        role: ConnectionRole,
    },
}

/// Tracks every live overlay connection by role and direction.
///
/// Counts live in one atomic per (role, direction) pair, so [`counts`]
/// never blocks. Under concurrent churn the individual counters may be read
/// at slightly different instants.
///
/// A connection keeps its role for its whole life. A renegotiated role is a
/// disconnect followed by a connect with a fresh id.
///
/// [`counts`]: ConnectionRegistry::counts
///
/// # Examples
///
/// ```
/// use overlay_session::connection::{ConnectionRegistry, ConnectionRole, Direction};
///
/// let registry = ConnectionRegistry::new();
/// let remote = "203.0.113.5:6346".parse().unwrap();
///
/// let ids: Vec<_> = (0..3)
///     .map(|_| {
///         registry.on_connected(remote, ConnectionRole::UltrapeerToLeaf, Direction::Outbound)
///     })
///     .collect();
/// registry.on_disconnected(ids[0]).unwrap();
///
/// let counts = registry.counts();
/// assert_eq!(counts.get(ConnectionRole::UltrapeerToLeaf, Direction::Outbound), 2);
/// ```
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    counters: [[AtomicUsize; 2]; 4],
    waiting_sockets: Gauge,
    next_id: AtomicU64,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers an established connection and returns its id.
    pub fn on_connected(
        &self,
        remote: SocketAddr,
        role: ConnectionRole,
        direction: Direction,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connection = Connection {
            id,
            remote,
            role,
            direction,
            established_at: Instant::now(),
        };

        // Count first so a racing disconnect can never decrement below zero.
        self.counter(role, direction).fetch_add(1, Ordering::AcqRel);
        self.connections.insert(id, connection.clone());

        debug!(%id, %remote, ?role, ?direction, "connection registered");
        self.publish(ConnectionEvent::Connected(connection));
        id
    }

    /// Removes a closed connection.
    ///
    /// Unknown ids, typically duplicate close events from the network layer,
    /// leave the registry untouched.
    pub fn on_disconnected(&self, id: ConnectionId) -> Result<Connection, RegistryError> {
        let Some((_, connection)) = self.connections.remove(&id) else {
            debug!(%id, "disconnect for unknown connection ignored");
            return Err(RegistryError::UnknownConnectionId(id));
        };

        self.counter(connection.role, connection.direction)
            .fetch_sub(1, Ordering::AcqRel);

        debug!(%id, remote = %connection.remote, role = ?connection.role, "connection removed");
        self.publish(ConnectionEvent::Disconnected(connection.clone()));
        Ok(connection)
    }

    /// Changes the role of a live connection by closing and re-registering it.
    pub fn renegotiate(
        &self,
        id: ConnectionId,
        role: ConnectionRole,
    ) -> Result<ConnectionId, RegistryError> {
        let old = self.on_disconnected(id)?;
        Ok(self.on_connected(old.remote, role, old.direction))
    }

    /// Reports an outgoing attempt that never became a connection.
    pub fn on_connect_failed(&self, remote: SocketAddr, role: ConnectionRole) {
        debug!(%remote, ?role, "outgoing connection failed");
        self.publish(ConnectionEvent::ConnectFailed { remote, role });
    }

    /// A socket started waiting for a connect slot.
    pub fn socket_waiting(&self) {
        self.waiting_sockets.increment();
    }

    /// A waiting socket connected, failed, or was abandoned.
    pub fn socket_resolved(&self) -> Result<(), AccountingError> {
        self.waiting_sockets.decrement().map(drop)
    }

    pub fn waiting_sockets(&self) -> usize {
        self.waiting_sockets.get()
    }

    pub fn counts(&self) -> ConnectionCounts {
        let mut raw = [[0usize; 2]; 4];
        for role in ConnectionRole::ALL {
            for direction in Direction::ALL {
                raw[role.index()][direction.index()] =
                    self.counter(role, direction).load(Ordering::Acquire);
            }
        }
        ConnectionCounts::from_raw(raw)
    }

    pub fn count(&self, role: ConnectionRole, direction: Direction) -> usize {
        self.counter(role, direction).load(Ordering::Acquire)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(&id).map(|c| c.clone())
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.iter().map(|c| c.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    fn counter(&self, role: ConnectionRole, direction: Direction) -> &AtomicUsize {
        &self.counters[role.index()][direction.index()]
    }

    fn publish(&self, event: ConnectionEvent) {
        // No subscribers is fine; topology may not be running.
        let _ = self.events.send(event);
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        let (events, _) = broadcast::channel(CONNECTION_EVENT_CAPACITY);
        Self {
            connections: DashMap::new(),
            counters: std::array::from_fn(|_| std::array::from_fn(|_| AtomicUsize::new(0))),
            waiting_sockets: Gauge::new("waiting_sockets"),
            next_id: AtomicU64::new(0),
            events,
        }
    }
}
