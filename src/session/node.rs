use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::info;

use super::info::{SessionInfo, SessionSnapshot};
use crate::cache::{ByteBufferPool, ContentResponseCache, CreationCache, DiskIoCache, SegmentKey};
use crate::config::SessionConfig;
use crate::connection::{
    ConnectionRegistry, ConnectionRole, NodeRole, TopologyManager, UplinkCapability,
};
use crate::demand::TransferDemandTracker;
use crate::error::SessionError;
use crate::reachability::ReachabilityProbe;

/// The session core of one running node.
///
/// Built once at node startup. Collaborators receive the component handles
/// they need from it; nothing is reachable through a global. The core never
/// pushes to its consumers: diagnostics pull through [`SessionInfo`].
///
/// # Examples
///
/// ```
/// use overlay_session::{SessionConfig, SessionCore, SessionInfo};
/// use overlay_session::connection::{ConnectionRole, Direction};
/// use std::sync::Arc;
///
/// let session = SessionCore::new(SessionConfig::default(), Arc::new(|| false)).unwrap();
///
/// let remote = "198.51.100.1:6346".parse().unwrap();
/// session
///     .connections()
///     .on_connected(remote, ConnectionRole::LeafToUltrapeer, Direction::Outbound);
/// session.demand().download_waiting();
///
/// let snapshot = session.snapshot();
/// assert_eq!(snapshot.leaf_to_ultrapeer_connections, 1);
/// assert_eq!(session.waiting_downloads(), 1);
/// ```
pub struct SessionCore {
    started_at: Instant,
    connections: Arc<ConnectionRegistry>,
    topology: Arc<TopologyManager>,
    reachability: Arc<ReachabilityProbe>,
    demand: Arc<TransferDemandTracker>,
    disk_cache: Arc<DiskIoCache<SegmentKey>>,
    creation_cache: Arc<CreationCache<SegmentKey>>,
    content_responses: Arc<ContentResponseCache>,
    buffers: Arc<ByteBufferPool>,
}

impl SessionCore {
    pub fn new(
        config: SessionConfig,
        uplink: Arc<dyn UplinkCapability>,
    ) -> Result<Arc<Self>, SessionError> {
        config.validate()?;

        let connections = ConnectionRegistry::new();
        let topology = TopologyManager::new(Arc::clone(&connections), uplink, config.topology);

        info!(
            port = config.reachability.port,
            disk_cache = config.disk_cache.capacity,
            "session core created"
        );

        Ok(Arc::new(Self {
            started_at: Instant::now(),
            connections,
            topology,
            reachability: ReachabilityProbe::new(config.reachability),
            demand: TransferDemandTracker::new(),
            disk_cache: DiskIoCache::new(config.disk_cache),
            creation_cache: CreationCache::new(config.creation_cache),
            content_responses: ContentResponseCache::new(config.content_responses.capacity),
            buffers: ByteBufferPool::new(config.buffer_pool),
        }))
    }

    /// Starts topology negotiation. Must be called inside a tokio runtime.
    ///
    /// Returns `None` if negotiation is already running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        self.topology.spawn()
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn topology(&self) -> &Arc<TopologyManager> {
        &self.topology
    }

    pub fn reachability(&self) -> &Arc<ReachabilityProbe> {
        &self.reachability
    }

    pub fn demand(&self) -> &Arc<TransferDemandTracker> {
        &self.demand
    }

    pub fn disk_cache(&self) -> &Arc<DiskIoCache<SegmentKey>> {
        &self.disk_cache
    }

    pub fn creation_cache(&self) -> &Arc<CreationCache<SegmentKey>> {
        &self.creation_cache
    }

    pub fn content_responses(&self) -> &Arc<ContentResponseCache> {
        &self.content_responses
    }

    pub fn buffers(&self) -> &Arc<ByteBufferPool> {
        &self.buffers
    }

    /// Captures every [`SessionInfo`] field.
    ///
    /// Fields are read in a fixed order: connections, demand, caches,
    /// reachability, uptime. Each read is individually atomic; the whole
    /// snapshot is not, so values owned by different components may come from
    /// slightly different instants.
    pub fn snapshot(&self) -> SessionSnapshot {
        let counts = self.connections.counts();
        let waiting_sockets = self.connections.waiting_sockets();
        let node_role = self.topology.role();

        let waiting_downloads = self.demand.waiting_downloads();
        let individual_downloaders = self.demand.individual_downloaders();
        let pending_timeouts = self.demand.pending_timeouts();

        let content_responses_size = self.content_responses.len();
        let creation_cache_size = self.creation_cache.len();
        let disk_byte_cache_size = self.disk_cache.size_bytes();
        let disk_verifying_cache_size = self.disk_cache.verifying_size_bytes();
        let disk_queue_size = self.disk_cache.queue_depth();
        let byte_buffer_cache_size = self.buffers.bytes_held();

        SessionSnapshot {
            ultrapeer_to_leaf_connections: counts.role_total(ConnectionRole::UltrapeerToLeaf),
            leaf_to_ultrapeer_connections: counts.role_total(ConnectionRole::LeafToUltrapeer),
            ultrapeer_to_ultrapeer_connections: counts
                .role_total(ConnectionRole::UltrapeerToUltrapeer),
            old_connections: counts.role_total(ConnectionRole::LegacyUnrouted),
            waiting_sockets,
            node_role,
            waiting_downloads,
            individual_downloaders,
            pending_timeouts,
            content_responses_size,
            creation_cache_size,
            disk_byte_cache_size,
            disk_verifying_cache_size,
            disk_queue_size,
            byte_buffer_cache_size,
            guess_capable: self.reachability.is_guess_capable(),
            can_receive_solicited: self.reachability.can_receive_solicited(),
            accepted_incoming_connection: self.reachability.accepted_incoming(),
            port: self.reachability.port(),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl SessionInfo for SessionCore {
    fn pending_timeouts(&self) -> usize {
        self.demand.pending_timeouts()
    }

    fn waiting_downloads(&self) -> usize {
        self.demand.waiting_downloads()
    }

    fn individual_downloaders(&self) -> usize {
        self.demand.individual_downloaders()
    }

    fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn ultrapeer_to_leaf_connections(&self) -> usize {
        self.connections.counts().role_total(ConnectionRole::UltrapeerToLeaf)
    }

    fn leaf_to_ultrapeer_connections(&self) -> usize {
        self.connections.counts().role_total(ConnectionRole::LeafToUltrapeer)
    }

    fn ultrapeer_to_ultrapeer_connections(&self) -> usize {
        self.connections
            .counts()
            .role_total(ConnectionRole::UltrapeerToUltrapeer)
    }

    fn old_connections(&self) -> usize {
        self.connections.counts().role_total(ConnectionRole::LegacyUnrouted)
    }

    fn content_responses_size(&self) -> usize {
        self.content_responses.len()
    }

    fn creation_cache_size(&self) -> usize {
        self.creation_cache.len()
    }

    fn disk_byte_cache_size(&self) -> usize {
        self.disk_cache.size_bytes()
    }

    fn disk_verifying_cache_size(&self) -> usize {
        self.disk_cache.verifying_size_bytes()
    }

    fn disk_queue_size(&self) -> usize {
        self.disk_cache.queue_depth()
    }

    fn byte_buffer_cache_size(&self) -> usize {
        self.buffers.bytes_held()
    }

    fn waiting_sockets(&self) -> usize {
        self.connections.waiting_sockets()
    }

    fn is_guess_capable(&self) -> bool {
        self.reachability.is_guess_capable()
    }

    fn can_receive_solicited(&self) -> bool {
        self.reachability.can_receive_solicited()
    }

    fn accepted_incoming_connection(&self) -> bool {
        self.reachability.accepted_incoming()
    }

    fn port(&self) -> u16 {
        self.reachability.port()
    }

    fn node_role(&self) -> NodeRole {
        self.topology.role()
    }
}
