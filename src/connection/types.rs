use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

/// The overlay role of a single connection, seen from this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionRole {
    /// We are an ultrapeer; the remote is one of our leaves.
    UltrapeerToLeaf,
    /// We are a leaf; the remote is one of our ultrapeers.
    LeafToUltrapeer,
    /// Both ends are ultrapeers.
    UltrapeerToUltrapeer,
    /// Pre-ultrapeer peer that does not take part in query routing.
    LegacyUnrouted,
}

impl ConnectionRole {
    pub const ALL: [ConnectionRole; 4] = [
        ConnectionRole::UltrapeerToLeaf,
        ConnectionRole::LeafToUltrapeer,
        ConnectionRole::UltrapeerToUltrapeer,
        ConnectionRole::LegacyUnrouted,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            ConnectionRole::UltrapeerToLeaf => 0,
            ConnectionRole::LeafToUltrapeer => 1,
            ConnectionRole::UltrapeerToUltrapeer => 2,
            ConnectionRole::LegacyUnrouted => 3,
        }
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Inbound, Direction::Outbound];

    pub(crate) fn index(self) -> usize {
        match self {
            Direction::Inbound => 0,
            Direction::Outbound => 1,
        }
    }
}

/// Process-unique connection identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A live overlay connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub remote: SocketAddr,
    pub role: ConnectionRole,
    pub direction: Direction,
    pub established_at: Instant,
}

/// Live connection counts per role and direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionCounts {
    counts: [[usize; 2]; 4],
}

impl ConnectionCounts {
    pub(crate) fn from_raw(counts: [[usize; 2]; 4]) -> Self {
        Self { counts }
    }

    pub fn get(&self, role: ConnectionRole, direction: Direction) -> usize {
        self.counts[role.index()][direction.index()]
    }

    /// Connections with `role` in either direction.
    pub fn role_total(&self, role: ConnectionRole) -> usize {
        self.counts[role.index()].iter().sum()
    }

    pub fn direction_total(&self, direction: Direction) -> usize {
        self.counts.iter().map(|row| row[direction.index()]).sum()
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }
}
