use std::time::Duration;

use crate::connection::NodeRole;

/// Read-only diagnostics view of a running session.
///
/// Each accessor reads one value from the component that owns it, with no
/// cross-component locking. Reading several accessors in a row therefore
/// gives a best-effort view that may be torn under concurrent churn; use
/// [`SessionCore::snapshot`](crate::SessionCore::snapshot) to capture all
/// fields in a fixed order.
///
/// Connection accessors count both directions.
pub trait SessionInfo {
    fn pending_timeouts(&self) -> usize;

    /// Downloads waiting to be started.
    fn waiting_downloads(&self) -> usize;

    /// Individual downloader tasks currently running.
    fn individual_downloaders(&self) -> usize;

    fn uptime(&self) -> Duration;

    fn ultrapeer_to_leaf_connections(&self) -> usize;

    fn leaf_to_ultrapeer_connections(&self) -> usize;

    fn ultrapeer_to_ultrapeer_connections(&self) -> usize;

    /// Legacy connections that do not take part in query routing.
    fn old_connections(&self) -> usize;

    fn content_responses_size(&self) -> usize;

    fn creation_cache_size(&self) -> usize;

    fn disk_byte_cache_size(&self) -> usize;

    fn disk_verifying_cache_size(&self) -> usize;

    fn disk_queue_size(&self) -> usize;

    fn byte_buffer_cache_size(&self) -> usize;

    fn waiting_sockets(&self) -> usize;

    /// Whether an unsolicited datagram has ever reached this node, which is
    /// required to run GUESS queries.
    fn is_guess_capable(&self) -> bool;

    fn can_receive_solicited(&self) -> bool;

    fn accepted_incoming_connection(&self) -> bool;

    fn port(&self) -> u16;

    fn node_role(&self) -> NodeRole;
}

/// All [`SessionInfo`] fields captured at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub ultrapeer_to_leaf_connections: usize,
    pub leaf_to_ultrapeer_connections: usize,
    pub ultrapeer_to_ultrapeer_connections: usize,
    pub old_connections: usize,
    pub waiting_sockets: usize,
    pub node_role: NodeRole,
    pub waiting_downloads: usize,
    pub individual_downloaders: usize,
    pub pending_timeouts: usize,
    pub content_responses_size: usize,
    pub creation_cache_size: usize,
    pub disk_byte_cache_size: usize,
    pub disk_verifying_cache_size: usize,
    pub disk_queue_size: usize,
    pub byte_buffer_cache_size: usize,
    pub guess_capable: bool,
    pub can_receive_solicited: bool,
    pub accepted_incoming_connection: bool,
    pub port: u16,
    pub uptime: Duration,
}

impl SessionInfo for SessionSnapshot {
    fn pending_timeouts(&self) -> usize {
        self.pending_timeouts
    }

    fn waiting_downloads(&self) -> usize {
        self.waiting_downloads
    }

    fn individual_downloaders(&self) -> usize {
        self.individual_downloaders
    }

    fn uptime(&self) -> Duration {
        self.uptime
    }

    fn ultrapeer_to_leaf_connections(&self) -> usize {
        self.ultrapeer_to_leaf_connections
    }

    fn leaf_to_ultrapeer_connections(&self) -> usize {
        self.leaf_to_ultrapeer_connections
    }

    fn ultrapeer_to_ultrapeer_connections(&self) -> usize {
        self.ultrapeer_to_ultrapeer_connections
    }

    fn old_connections(&self) -> usize {
        self.old_connections
    }

    fn content_responses_size(&self) -> usize {
        self.content_responses_size
    }

    fn creation_cache_size(&self) -> usize {
        self.creation_cache_size
    }

    fn disk_byte_cache_size(&self) -> usize {
        self.disk_byte_cache_size
    }

    fn disk_verifying_cache_size(&self) -> usize {
        self.disk_verifying_cache_size
    }

    fn disk_queue_size(&self) -> usize {
        self.disk_queue_size
    }

    fn byte_buffer_cache_size(&self) -> usize {
        self.byte_buffer_cache_size
    }

    fn waiting_sockets(&self) -> usize {
        self.waiting_sockets
    }

    fn is_guess_capable(&self) -> bool {
        self.guess_capable
    }

    fn can_receive_solicited(&self) -> bool {
        self.can_receive_solicited
    }

    fn accepted_incoming_connection(&self) -> bool {
        self.accepted_incoming_connection
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn node_role(&self) -> NodeRole {
        self.node_role
    }
}
