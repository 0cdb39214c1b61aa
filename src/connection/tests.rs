use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn remote() -> SocketAddr {
    "203.0.113.9:6346".parse().unwrap()
}

fn connection(role: ConnectionRole, direction: Direction) -> Connection {
    Connection {
        id: ConnectionId(0),
        remote: remote(),
        role,
        direction,
        established_at: Instant::now(),
    }
}

fn failed_ultrapeer() -> ConnectionEvent {
    ConnectionEvent::ConnectFailed {
        remote: remote(),
        role: ConnectionRole::UltrapeerToUltrapeer,
    }
}

#[test]
fn test_connect_disconnect_counts() {
    let registry = ConnectionRegistry::new();

    let ids: Vec<_> = (0..3)
        .map(|_| {
            registry.on_connected(remote(), ConnectionRole::UltrapeerToLeaf, Direction::Outbound)
        })
        .collect();
    registry.on_disconnected(ids[1]).unwrap();

    let counts = registry.counts();
    assert_eq!(counts.get(ConnectionRole::UltrapeerToLeaf, Direction::Outbound), 2);
    assert_eq!(counts.get(ConnectionRole::UltrapeerToLeaf, Direction::Inbound), 0);
    assert_eq!(counts.total(), 2);
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_counts_by_role_and_direction() {
    let registry = ConnectionRegistry::new();
    registry.on_connected(remote(), ConnectionRole::LeafToUltrapeer, Direction::Outbound);
    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Inbound);
    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Outbound);
    registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);

    let counts = registry.counts();
    assert_eq!(counts.role_total(ConnectionRole::UltrapeerToUltrapeer), 2);
    assert_eq!(counts.role_total(ConnectionRole::LeafToUltrapeer), 1);
    assert_eq!(counts.role_total(ConnectionRole::LegacyUnrouted), 1);
    assert_eq!(counts.direction_total(Direction::Inbound), 2);
    assert_eq!(counts.direction_total(Direction::Outbound), 2);
    assert_eq!(
        registry.count(ConnectionRole::UltrapeerToUltrapeer, Direction::Inbound),
        1
    );
}

#[test]
fn test_unknown_disconnect_is_noop() {
    let registry = ConnectionRegistry::new();
    let id = registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);

    assert_eq!(
        registry.on_disconnected(ConnectionId(999)),
        Err(RegistryError::UnknownConnectionId(ConnectionId(999)))
    );
    assert_eq!(registry.counts().total(), 1);

    let closed = registry.on_disconnected(id).unwrap();
    assert_eq!(closed.role, ConnectionRole::LegacyUnrouted);
    assert_eq!(
        registry.on_disconnected(id),
        Err(RegistryError::UnknownConnectionId(id))
    );
    assert_eq!(registry.counts().total(), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_ids_never_reused() {
    let registry = ConnectionRegistry::new();
    let first =
        registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);
    registry.on_disconnected(first).unwrap();
    let second =
        registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);
    assert_ne!(first, second);
    assert!(registry.get(first).is_none());
    assert_eq!(registry.get(second).map(|c| c.id), Some(second));
}

#[test]
fn test_renegotiate_replaces_connection() {
    let registry = ConnectionRegistry::new();
    let id = registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);

    let new_id = registry
        .renegotiate(id, ConnectionRole::UltrapeerToLeaf)
        .unwrap();

    assert_ne!(id, new_id);
    assert!(registry.get(id).is_none());
    let renegotiated = registry.get(new_id).unwrap();
    assert_eq!(renegotiated.role, ConnectionRole::UltrapeerToLeaf);
    assert_eq!(renegotiated.direction, Direction::Inbound);

    let counts = registry.counts();
    assert_eq!(counts.role_total(ConnectionRole::LegacyUnrouted), 0);
    assert_eq!(counts.get(ConnectionRole::UltrapeerToLeaf, Direction::Inbound), 1);

    assert!(registry
        .renegotiate(id, ConnectionRole::LeafToUltrapeer)
        .is_err());
}

#[test]
fn test_random_churn_matches_net_balance() {
    let mut rng = StdRng::seed_from_u64(42);
    let registry = ConnectionRegistry::new();
    let mut live: HashMap<ConnectionId, (ConnectionRole, Direction)> = HashMap::new();

    for _ in 0..2000 {
        if live.is_empty() || rng.random_bool(0.55) {
            let role = ConnectionRole::ALL[rng.random_range(0..4)];
            let direction = Direction::ALL[rng.random_range(0..2)];
            let id = registry.on_connected(remote(), role, direction);
            live.insert(id, (role, direction));
        } else if rng.random_bool(0.1) {
            let _ = registry.on_disconnected(ConnectionId(u64::MAX - rng.random_range(0..10)));
        } else {
            let id = *live.keys().next().unwrap();
            live.remove(&id);
            registry.on_disconnected(id).unwrap();
        }
    }

    let counts = registry.counts();
    for role in ConnectionRole::ALL {
        for direction in Direction::ALL {
            let expected = live
                .values()
                .filter(|(r, d)| *r == role && *d == direction)
                .count();
            assert_eq!(counts.get(role, direction), expected);
        }
    }
    assert_eq!(registry.len(), live.len());
}

#[test]
fn test_concurrent_churn() {
    let registry = ConnectionRegistry::new();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let role = ConnectionRole::ALL[i % 4];
                for _ in 0..500 {
                    let id = registry.on_connected(remote(), role, Direction::Outbound);
                    let _ = registry.counts();
                    registry.on_disconnected(id).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(registry.counts().total(), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_waiting_sockets() {
    let registry = ConnectionRegistry::new();
    registry.socket_waiting();
    registry.socket_waiting();
    registry.socket_resolved().unwrap();
    assert_eq!(registry.waiting_sockets(), 1);
}

#[test]
fn test_events_published() {
    let registry = ConnectionRegistry::new();
    let mut events = registry.subscribe();

    let id = registry.on_connected(remote(), ConnectionRole::LeafToUltrapeer, Direction::Outbound);
    registry.on_disconnected(id).unwrap();
    registry.on_connect_failed(remote(), ConnectionRole::UltrapeerToUltrapeer);

    match events.try_recv().unwrap() {
        ConnectionEvent::Connected(c) => assert_eq!(c.id, id),
        other => panic!("unexpected event: {other:?}"),
    }
    match events.try_recv().unwrap() {
        ConnectionEvent::Disconnected(c) => assert_eq!(c.id, id),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(events.try_recv().unwrap(), failed_ultrapeer());
}

#[test]
fn test_leaf_promotes_to_candidate() {
    let mut policy = TopologyPolicy::new(TopologyConfig::default());
    let event = ConnectionEvent::Connected(connection(
        ConnectionRole::LeafToUltrapeer,
        Direction::Outbound,
    ));

    assert_eq!(
        policy.evaluate(&event, &ConnectionCounts::default(), false, Instant::now()),
        None
    );
    assert_eq!(
        policy.evaluate(&event, &ConnectionCounts::default(), true, Instant::now()),
        Some(RoleChange {
            from: NodeRole::Leaf,
            to: NodeRole::UltrapeerCandidate,
        })
    );
}

#[test]
fn test_leaf_with_outgoing_leaves_stays_leaf() {
    let registry = ConnectionRegistry::new();
    registry.on_connected(remote(), ConnectionRole::UltrapeerToLeaf, Direction::Outbound);

    let mut policy = TopologyPolicy::new(TopologyConfig::default());
    let event = ConnectionEvent::Connected(connection(
        ConnectionRole::UltrapeerToLeaf,
        Direction::Outbound,
    ));
    assert_eq!(
        policy.evaluate(&event, &registry.counts(), true, Instant::now()),
        None
    );
    assert_eq!(policy.role(), NodeRole::Leaf);
}

#[test]
fn test_candidate_becomes_ultrapeer_on_link() {
    let registry = ConnectionRegistry::new();
    let mut policy = TopologyPolicy::new(TopologyConfig::default());
    let now = Instant::now();

    policy.evaluate(&failed_ultrapeer(), &registry.counts(), true, now);
    assert_eq!(policy.role(), NodeRole::UltrapeerCandidate);

    registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);
    let legacy = ConnectionEvent::Connected(connection(
        ConnectionRole::LegacyUnrouted,
        Direction::Inbound,
    ));
    assert_eq!(policy.evaluate(&legacy, &registry.counts(), true, now), None);

    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Outbound);
    let link = ConnectionEvent::Connected(connection(
        ConnectionRole::UltrapeerToUltrapeer,
        Direction::Outbound,
    ));
    assert_eq!(
        policy.evaluate(&link, &registry.counts(), true, now),
        Some(RoleChange {
            from: NodeRole::UltrapeerCandidate,
            to: NodeRole::Ultrapeer,
        })
    );
}

#[test]
fn test_candidate_promoted_by_live_link_without_its_event() {
    let registry = ConnectionRegistry::new();
    let mut policy = TopologyPolicy::new(TopologyConfig::default());
    let now = Instant::now();

    policy.reconcile(&registry.counts(), true, now);
    assert_eq!(policy.role(), NodeRole::UltrapeerCandidate);

    // The link's own event never reaches the policy.
    registry.on_connected(remote(), ConnectionRole::UltrapeerToLeaf, Direction::Inbound);
    let legacy = ConnectionEvent::Connected(connection(
        ConnectionRole::LegacyUnrouted,
        Direction::Inbound,
    ));
    assert_eq!(
        policy.evaluate(&legacy, &registry.counts(), true, now),
        Some(RoleChange {
            from: NodeRole::UltrapeerCandidate,
            to: NodeRole::Ultrapeer,
        })
    );
}

#[test]
fn test_candidate_losing_uplink_falls_back() {
    let mut policy = TopologyPolicy::new(TopologyConfig::default());
    let counts = ConnectionCounts::default();
    let now = Instant::now();

    policy.evaluate(&failed_ultrapeer(), &counts, true, now);
    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &counts, false, now),
        Some(RoleChange {
            from: NodeRole::UltrapeerCandidate,
            to: NodeRole::Leaf,
        })
    );
}

fn promoted_policy(config: TopologyConfig, now: Instant) -> TopologyPolicy {
    let mut policy = TopologyPolicy::new(config);
    let registry = ConnectionRegistry::new();
    let id =
        registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Outbound);
    let link = ConnectionEvent::Connected(connection(
        ConnectionRole::UltrapeerToUltrapeer,
        Direction::Outbound,
    ));
    policy.evaluate(&link, &registry.counts(), true, now);
    policy.evaluate(&link, &registry.counts(), true, now);
    assert_eq!(policy.role(), NodeRole::Ultrapeer);

    // Demotion tests start with the link gone.
    registry.on_disconnected(id).unwrap();
    policy
}

#[test]
fn test_ultrapeer_demoted_after_failures() {
    let config = TopologyConfig {
        max_failed_attempts: 3,
        retry_window: Duration::from_secs(60),
    };
    let start = Instant::now();
    let mut policy = promoted_policy(config, start);
    let counts = ConnectionCounts::default();

    assert_eq!(policy.evaluate(&failed_ultrapeer(), &counts, true, start), None);
    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &counts, true, start + Duration::from_secs(1)),
        None
    );
    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &counts, true, start + Duration::from_secs(2)),
        Some(RoleChange {
            from: NodeRole::Ultrapeer,
            to: NodeRole::Leaf,
        })
    );
    assert_eq!(policy.recent_failures(), 0);

    // Held off from re-promotion for one retry window.
    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &counts, true, start + Duration::from_secs(3)),
        None
    );
    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &counts, true, start + Duration::from_secs(90)),
        Some(RoleChange {
            from: NodeRole::Leaf,
            to: NodeRole::UltrapeerCandidate,
        })
    );
}

#[test]
fn test_failures_outside_window_forgotten() {
    let config = TopologyConfig {
        max_failed_attempts: 2,
        retry_window: Duration::from_secs(10),
    };
    let start = Instant::now();
    let mut policy = promoted_policy(config, start);
    let counts = ConnectionCounts::default();

    policy.evaluate(&failed_ultrapeer(), &counts, true, start);
    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &counts, true, start + Duration::from_secs(30)),
        None
    );
    assert_eq!(policy.recent_failures(), 1);
    assert_eq!(policy.role(), NodeRole::Ultrapeer);
}

#[test]
fn test_live_ultrapeer_link_prevents_demotion() {
    let config = TopologyConfig {
        max_failed_attempts: 1,
        retry_window: Duration::from_secs(60),
    };
    let now = Instant::now();
    let mut policy = promoted_policy(config, now);

    let registry = ConnectionRegistry::new();
    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Inbound);

    assert_eq!(
        policy.evaluate(&failed_ultrapeer(), &registry.counts(), true, now),
        None
    );
    assert_eq!(policy.role(), NodeRole::Ultrapeer);
}

#[test]
fn test_uplink_bandwidth_threshold() {
    let uplink = UplinkBandwidth::new(1_000);
    assert!(!uplink.meets_ultrapeer_threshold());
    uplink.record(1_500);
    assert!(uplink.meets_ultrapeer_threshold());
    assert_eq!(uplink.measured(), 1_500);
}

#[tokio::test]
async fn test_manager_follows_registry_events() {
    let registry = ConnectionRegistry::new();
    let manager = TopologyManager::new(
        Arc::clone(&registry),
        Arc::new(|| true),
        TopologyConfig::default(),
    );
    let mut roles = manager.subscribe_role();
    let task = manager.spawn().expect("first spawn");

    registry.on_connected(remote(), ConnectionRole::LeafToUltrapeer, Direction::Outbound);
    tokio::time::timeout(Duration::from_secs(5), roles.changed())
        .await
        .expect("role change")
        .unwrap();
    assert_eq!(*roles.borrow(), NodeRole::UltrapeerCandidate);

    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Outbound);
    tokio::time::timeout(Duration::from_secs(5), roles.changed())
        .await
        .expect("role change")
        .unwrap();
    assert_eq!(*roles.borrow(), NodeRole::Ultrapeer);
    assert_eq!(manager.role(), NodeRole::Ultrapeer);

    drop(manager);
    registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("task stopped")
        .unwrap();
}

#[test]
fn test_manager_handle_event_directly() {
    let registry = ConnectionRegistry::new();
    let uplink = UplinkBandwidth::new(10);
    let manager = TopologyManager::new(
        Arc::clone(&registry),
        uplink.clone(),
        TopologyConfig::default(),
    );

    let event = failed_ultrapeer();
    assert_eq!(manager.handle_event(&event), None);

    uplink.record(10);
    assert!(manager.handle_event(&event).is_some());
    assert_eq!(manager.role(), NodeRole::UltrapeerCandidate);
}

#[tokio::test]
async fn test_manager_recovers_from_lagged_events() {
    let registry = ConnectionRegistry::new();
    let manager = TopologyManager::new(
        Arc::clone(&registry),
        Arc::new(|| true),
        TopologyConfig::default(),
    );
    manager.resync();
    assert_eq!(manager.role(), NodeRole::UltrapeerCandidate);
    let mut roles = manager.subscribe_role();
    let _task = manager.spawn().expect("first spawn");

    // The current-thread runtime does not run the task until we yield, so the
    // link's event falls out of the channel behind the burst.
    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Outbound);
    for _ in 0..crate::constants::CONNECTION_EVENT_CAPACITY + 44 {
        registry.on_connected(remote(), ConnectionRole::LegacyUnrouted, Direction::Inbound);
    }

    tokio::time::timeout(Duration::from_secs(5), roles.changed())
        .await
        .expect("role change")
        .unwrap();
    assert_eq!(manager.role(), NodeRole::Ultrapeer);
    assert_eq!(registry.counts().role_total(ConnectionRole::UltrapeerToUltrapeer), 1);
}

#[test]
fn test_manager_resync_after_missed_link() {
    let registry = ConnectionRegistry::new();
    let manager = TopologyManager::new(
        Arc::clone(&registry),
        Arc::new(|| true),
        TopologyConfig::default(),
    );
    manager.resync();
    registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Inbound);

    assert_eq!(
        manager.resync(),
        Some(RoleChange {
            from: NodeRole::UltrapeerCandidate,
            to: NodeRole::Ultrapeer,
        })
    );
    assert_eq!(manager.resync(), None);
}

#[tokio::test]
async fn test_manager_spawns_once() {
    let registry = ConnectionRegistry::new();
    let manager = TopologyManager::new(
        Arc::clone(&registry),
        Arc::new(|| true),
        TopologyConfig {
            max_failed_attempts: 5,
            retry_window: Duration::from_secs(300),
        },
    );
    manager.resync();
    let mut roles = manager.subscribe_role();
    let _task = manager.spawn().expect("first spawn");
    assert!(manager.spawn().is_none());

    let id =
        registry.on_connected(remote(), ConnectionRole::UltrapeerToUltrapeer, Direction::Outbound);
    while *roles.borrow_and_update() != NodeRole::Ultrapeer {
        tokio::time::timeout(Duration::from_secs(5), roles.changed())
            .await
            .expect("role change")
            .unwrap();
    }
    registry.on_disconnected(id).unwrap();

    for _ in 0..3 {
        registry.on_connect_failed(remote(), ConnectionRole::UltrapeerToUltrapeer);
    }
    while manager.recent_failures() < 3 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(manager.recent_failures(), 3);
    assert_eq!(manager.role(), NodeRole::Ultrapeer);
}
