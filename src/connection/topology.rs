use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::registry::{ConnectionEvent, ConnectionRegistry};
use super::types::{ConnectionCounts, ConnectionRole, Direction};
use crate::constants::{MAX_ULTRAPEER_CONNECT_FAILURES, ULTRAPEER_RETRY_WINDOW};

/// The role this node plays in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeRole {
    #[default]
    Leaf,
    /// Capable of serving as an ultrapeer and looking for ultrapeer links.
    UltrapeerCandidate,
    Ultrapeer,
}

impl NodeRole {
    fn to_u8(self) -> u8 {
        match self {
            NodeRole::Leaf => 0,
            NodeRole::UltrapeerCandidate => 1,
            NodeRole::Ultrapeer => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => NodeRole::UltrapeerCandidate,
            2 => NodeRole::Ultrapeer,
            _ => NodeRole::Leaf,
        }
    }
}

/// Whether the uplink is good enough to serve as an ultrapeer.
///
/// Supplied by the discovery layer, which owns bandwidth measurement.
pub trait UplinkCapability: Send + Sync {
    fn meets_ultrapeer_threshold(&self) -> bool;
}

impl<F> UplinkCapability for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn meets_ultrapeer_threshold(&self) -> bool {
        self()
    }
}

/// An uplink signal fed with measured upload bandwidth.
#[derive(Debug)]
pub struct UplinkBandwidth {
    measured_bps: AtomicU64,
    threshold_bps: u64,
}

impl UplinkBandwidth {
    pub fn new(threshold_bps: u64) -> Arc<Self> {
        Arc::new(Self {
            measured_bps: AtomicU64::new(0),
            threshold_bps,
        })
    }

    pub fn record(&self, bytes_per_sec: u64) {
        self.measured_bps.store(bytes_per_sec, Ordering::Release);
    }

    pub fn measured(&self) -> u64 {
        self.measured_bps.load(Ordering::Acquire)
    }
}

impl UplinkCapability for UplinkBandwidth {
    fn meets_ultrapeer_threshold(&self) -> bool {
        self.measured() >= self.threshold_bps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Failed outgoing ultrapeer connections that trigger demotion.
    pub max_failed_attempts: usize,
    pub retry_window: Duration,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: MAX_ULTRAPEER_CONNECT_FAILURES,
            retry_window: ULTRAPEER_RETRY_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleChange {
    pub from: NodeRole,
    pub to: NodeRole,
}

/// Promotion and demotion rules, evaluated once per connection event.
///
/// - A leaf becomes a candidate when it has no outgoing ultrapeer-to-leaf
///   connections and its uplink meets the threshold.
/// - A candidate becomes an ultrapeer while any ultrapeer-to-ultrapeer or
///   ultrapeer-to-leaf connection is live, and falls back to leaf if its
///   uplink stops qualifying.
/// - A candidate or ultrapeer is demoted when enough outgoing ultrapeer
///   connections fail inside the retry window while no ultrapeer-to-ultrapeer
///   connection is live. A demoted node stays a leaf for one retry window.
#[derive(Debug)]
pub struct TopologyPolicy {
    role: NodeRole,
    config: TopologyConfig,
    failures: VecDeque<Instant>,
    demoted_at: Option<Instant>,
}

impl TopologyPolicy {
    pub fn new(config: TopologyConfig) -> Self {
        Self {
            role: NodeRole::Leaf,
            config,
            failures: VecDeque::new(),
            demoted_at: None,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn recent_failures(&self) -> usize {
        self.failures.len()
    }

    /// Records `event` and then applies the rules to the current counts.
    pub fn evaluate(
        &mut self,
        event: &ConnectionEvent,
        counts: &ConnectionCounts,
        uplink_ok: bool,
        now: Instant,
    ) -> Option<RoleChange> {
        self.record(event, now);
        self.reconcile(counts, uplink_ok, now)
    }

    /// Applies the rules to the current counts without recording an event.
    ///
    /// Every rule reads live counts, so this alone brings the role up to date
    /// after events were missed.
    pub fn reconcile(
        &mut self,
        counts: &ConnectionCounts,
        uplink_ok: bool,
        now: Instant,
    ) -> Option<RoleChange> {
        self.expire_failures(now);

        let next = match self.role {
            NodeRole::Leaf => {
                let no_leaves =
                    counts.get(ConnectionRole::UltrapeerToLeaf, Direction::Outbound) == 0;
                let held_off = self
                    .demoted_at
                    .is_some_and(|at| now.saturating_duration_since(at) < self.config.retry_window);
                (no_leaves && uplink_ok && !held_off).then_some(NodeRole::UltrapeerCandidate)
            }
            NodeRole::UltrapeerCandidate => {
                if self.should_demote(counts) || !uplink_ok {
                    Some(NodeRole::Leaf)
                } else if has_ultrapeer_link(counts) {
                    Some(NodeRole::Ultrapeer)
                } else {
                    None
                }
            }
            NodeRole::Ultrapeer => self.should_demote(counts).then_some(NodeRole::Leaf),
        }?;

        let change = RoleChange {
            from: self.role,
            to: next,
        };
        if next == NodeRole::Leaf {
            self.failures.clear();
            self.demoted_at = Some(now);
        }
        self.role = next;
        Some(change)
    }

    fn record(&mut self, event: &ConnectionEvent, now: Instant) {
        match event {
            ConnectionEvent::ConnectFailed {
                role: ConnectionRole::UltrapeerToUltrapeer,
                ..
            } => self.failures.push_back(now),
            ConnectionEvent::Connected(c)
                if c.role == ConnectionRole::UltrapeerToUltrapeer
                    && c.direction == Direction::Outbound =>
            {
                self.failures.clear()
            }
            _ => {}
        }
    }

    fn expire_failures(&mut self, now: Instant) {
        while let Some(oldest) = self.failures.front() {
            if now.saturating_duration_since(*oldest) <= self.config.retry_window {
                break;
            }
            self.failures.pop_front();
        }
    }

    fn should_demote(&self, counts: &ConnectionCounts) -> bool {
        self.failures.len() >= self.config.max_failed_attempts
            && counts.role_total(ConnectionRole::UltrapeerToUltrapeer) == 0
    }
}

fn has_ultrapeer_link(counts: &ConnectionCounts) -> bool {
    counts.role_total(ConnectionRole::UltrapeerToUltrapeer) > 0
        || counts.role_total(ConnectionRole::UltrapeerToLeaf) > 0
}

/// Applies [`TopologyPolicy`] to every registry event.
///
/// The current role is readable at any time without locking, and role
/// changes are published on a watch channel.
pub struct TopologyManager {
    registry: Arc<ConnectionRegistry>,
    uplink: Arc<dyn UplinkCapability>,
    policy: Mutex<TopologyPolicy>,
    role: AtomicU8,
    role_tx: watch::Sender<NodeRole>,
    running: AtomicBool,
}

impl TopologyManager {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        uplink: Arc<dyn UplinkCapability>,
        config: TopologyConfig,
    ) -> Arc<Self> {
        let (role_tx, _) = watch::channel(NodeRole::Leaf);
        Arc::new(Self {
            registry,
            uplink,
            policy: Mutex::new(TopologyPolicy::new(config)),
            role: AtomicU8::new(NodeRole::Leaf.to_u8()),
            role_tx,
            running: AtomicBool::new(false),
        })
    }

    pub fn role(&self) -> NodeRole {
        NodeRole::from_u8(self.role.load(Ordering::Acquire))
    }

    pub fn subscribe_role(&self) -> watch::Receiver<NodeRole> {
        self.role_tx.subscribe()
    }

    /// Failed outgoing ultrapeer connections inside the retry window.
    pub fn recent_failures(&self) -> usize {
        self.policy.lock().recent_failures()
    }

    /// Evaluates the policy for one event against the current counts.
    pub fn handle_event(&self, event: &ConnectionEvent) -> Option<RoleChange> {
        self.apply(|policy, counts, uplink_ok, now| policy.evaluate(event, counts, uplink_ok, now))
    }

    /// Re-evaluates the role against the current counts with no new event.
    pub fn resync(&self) -> Option<RoleChange> {
        self.apply(|policy, counts, uplink_ok, now| policy.reconcile(counts, uplink_ok, now))
    }

    fn apply<F>(&self, step: F) -> Option<RoleChange>
    where
        F: FnOnce(&mut TopologyPolicy, &ConnectionCounts, bool, Instant) -> Option<RoleChange>,
    {
        let counts = self.registry.counts();
        let uplink_ok = self.uplink.meets_ultrapeer_threshold();

        let mut policy = self.policy.lock();
        let change = step(&mut policy, &counts, uplink_ok, Instant::now())?;
        self.role.store(change.to.to_u8(), Ordering::Release);
        drop(policy);

        info!(from = ?change.from, to = ?change.to, "node role changed");
        self.role_tx.send_replace(change.to);
        Some(change)
    }

    /// Spawns the task that feeds registry events into the policy.
    ///
    /// Only the first call spawns; later calls return `None`. The
    /// subscription is taken before this returns, so no event registered
    /// afterwards is missed. The task ends once the manager is dropped.
    pub fn spawn(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("topology task already running");
            return None;
        }

        let mut events = self.registry.subscribe();
        let manager = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            loop {
                let event = events.recv().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                match event {
                    Ok(event) => {
                        manager.handle_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "topology fell behind connection events");
                        manager.resync();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("connection events closed, topology stopped");
                        break;
                    }
                }
            }
        }))
    }
}
