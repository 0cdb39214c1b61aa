//! UDP and TCP reachability self-diagnosis.
//!
//! A node behind NAT cannot reliably probe itself, so reachability is learned
//! passively: the network layer reports inbound traffic and the probe latches
//! what that traffic proves. Every latch is one-way. Once a datagram or
//! connection has made it through the firewall, that remains a fact about the
//! session and is never cleared.
//!
//! # Latches
//!
//! - `guess_capable` - an unsolicited datagram arrived, so GUESS queries can
//!   be answered directly
//! - `can_receive_solicited` - a reply to one of our own datagrams arrived
//! - `accepted_incoming` - a remote peer opened a TCP connection to us
//!
//! # Example
//!
//! ```
//! use overlay_session::reachability::{ReachabilityConfig, ReachabilityProbe};
//! use std::net::SocketAddr;
//!
//! let probe = ReachabilityProbe::new(ReachabilityConfig::default());
//! let peer: SocketAddr = "203.0.113.7:6346".parse().unwrap();
//!
//! let mut datagram = vec![0u8; 23];
//! datagram[19..23].copy_from_slice(&0u32.to_le_bytes());
//!
//! assert!(probe.on_unsolicited_datagram(peer, &datagram));
//! assert!(probe.is_guess_capable());
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::constants::{
    DATAGRAM_HEADER_LEN, DATAGRAM_PAYLOAD_LEN_OFFSET, DEFAULT_PORT, MAX_DATAGRAM_PAYLOAD,
};

/// Configuration for the reachability probe.
#[derive(Debug, Clone)]
pub struct ReachabilityConfig {
    /// Listening port reported before the socket layer binds.
    pub port: u16,
    /// Whether traffic from loopback and private addresses counts as proof
    /// of reachability. Useful for LAN-only deployments and tests.
    pub count_local_peers: bool,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            count_local_peers: false,
        }
    }
}

/// One-way reachability latches plus the bound listening port.
#[derive(Debug)]
pub struct ReachabilityProbe {
    guess_capable: AtomicBool,
    can_receive_solicited: AtomicBool,
    accepted_incoming: AtomicBool,
    port: AtomicU16,
    count_local_peers: bool,
}

impl ReachabilityProbe {
    pub fn new(config: ReachabilityConfig) -> Arc<Self> {
        Arc::new(Self {
            guess_capable: AtomicBool::new(false),
            can_receive_solicited: AtomicBool::new(false),
            accepted_incoming: AtomicBool::new(false),
            port: AtomicU16::new(config.port),
            count_local_peers: config.count_local_peers,
        })
    }

    /// Reports a datagram that no query of ours asked for.
    ///
    /// Returns `true` if the datagram counted towards `guess_capable`.
    pub fn on_unsolicited_datagram(&self, from: SocketAddr, datagram: &[u8]) -> bool {
        if !self.counts_as_remote(from.ip()) || !is_well_formed(datagram) {
            debug!(%from, len = datagram.len(), "ignoring unsolicited datagram");
            return false;
        }
        latch(&self.guess_capable, "guess_capable", from);
        true
    }

    /// Reports a datagram received in reply to one we sent.
    pub fn on_solicited_datagram(&self, from: SocketAddr, datagram: &[u8]) -> bool {
        if !self.counts_as_remote(from.ip()) || !is_well_formed(datagram) {
            debug!(%from, len = datagram.len(), "ignoring solicited datagram");
            return false;
        }
        latch(&self.can_receive_solicited, "can_receive_solicited", from);
        true
    }

    /// Reports a completed handshake on a remote-initiated TCP connection.
    pub fn on_incoming_accepted(&self, remote: SocketAddr) -> bool {
        if !self.counts_as_remote(remote.ip()) {
            debug!(%remote, "ignoring local incoming connection");
            return false;
        }
        latch(&self.accepted_incoming, "accepted_incoming", remote);
        true
    }

    pub fn set_port(&self, port: u16) {
        self.port.store(port, Ordering::Release);
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    pub fn is_guess_capable(&self) -> bool {
        self.guess_capable.load(Ordering::Acquire)
    }

    pub fn can_receive_solicited(&self) -> bool {
        self.can_receive_solicited.load(Ordering::Acquire)
    }

    pub fn accepted_incoming(&self) -> bool {
        self.accepted_incoming.load(Ordering::Acquire)
    }

    fn counts_as_remote(&self, ip: IpAddr) -> bool {
        self.count_local_peers || !is_local(ip)
    }
}

fn latch(flag: &AtomicBool, name: &'static str, from: SocketAddr) {
    if flag
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        info!(latch = name, %from, "reachability confirmed");
    }
}

fn is_well_formed(datagram: &[u8]) -> bool {
    if datagram.len() < DATAGRAM_HEADER_LEN {
        return false;
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&datagram[DATAGRAM_PAYLOAD_LEN_OFFSET..DATAGRAM_HEADER_LEN]);
    let payload_len = u32::from_le_bytes(len) as usize;
    payload_len <= MAX_DATAGRAM_PAYLOAD && payload_len == datagram.len() - DATAGRAM_HEADER_LEN
}

fn is_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_local(IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local, fe80::/10 link local
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; DATAGRAM_HEADER_LEN];
        buf[16] = 0x80;
        buf[DATAGRAM_PAYLOAD_LEN_OFFSET..DATAGRAM_HEADER_LEN]
            .copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    fn remote() -> SocketAddr {
        "198.51.100.20:6346".parse().unwrap()
    }

    #[test]
    fn test_initial_state() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());
        assert!(!probe.is_guess_capable());
        assert!(!probe.can_receive_solicited());
        assert!(!probe.accepted_incoming());
        assert_eq!(probe.port(), DEFAULT_PORT);
    }

    #[test]
    fn test_single_datagram_latches_guess() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());
        assert!(probe.on_unsolicited_datagram(remote(), &datagram(b"ping")));
        assert!(probe.is_guess_capable());
        assert!(!probe.can_receive_solicited());

        // Nothing after this point may clear the latch: malformed traffic,
        // ignored local traffic, and a long silence all leave it set.
        assert!(!probe.on_unsolicited_datagram(remote(), &[0u8; 5]));
        assert!(!probe.on_unsolicited_datagram("10.0.0.2:6346".parse().unwrap(), &datagram(b"")));
        assert!(probe.is_guess_capable());
    }

    #[test]
    fn test_malformed_datagrams_rejected() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());

        assert!(!probe.on_unsolicited_datagram(remote(), &[0u8; 10]));

        let mut lying = datagram(b"abc");
        lying.push(0);
        assert!(!probe.on_unsolicited_datagram(remote(), &lying));

        assert!(!probe.is_guess_capable());
    }

    #[test]
    fn test_solicited_latch() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());
        assert!(probe.on_solicited_datagram(remote(), &datagram(b"pong")));
        assert!(probe.can_receive_solicited());
        assert!(!probe.is_guess_capable());
    }

    #[test]
    fn test_incoming_accepted_latch() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());
        assert!(!probe.on_incoming_accepted("127.0.0.1:5000".parse().unwrap()));
        assert!(!probe.on_incoming_accepted("[fe80::1]:5000".parse().unwrap()));
        assert!(!probe.accepted_incoming());

        assert!(probe.on_incoming_accepted("[2001:db8::1]:5000".parse().unwrap()));
        assert!(probe.accepted_incoming());
        assert!(probe.on_incoming_accepted(remote()));
        assert!(probe.accepted_incoming());
    }

    #[test]
    fn test_mapped_local_addresses_ignored() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());
        assert!(!probe.on_incoming_accepted("[::ffff:10.0.0.1]:6346".parse().unwrap()));
        assert!(!probe.on_unsolicited_datagram(
            "[::ffff:127.0.0.1]:6346".parse().unwrap(),
            &datagram(b"ping")
        ));
        assert!(!probe.accepted_incoming());
        assert!(!probe.is_guess_capable());

        assert!(probe.on_incoming_accepted("[::ffff:198.51.100.20]:6346".parse().unwrap()));
        assert!(probe.accepted_incoming());
    }

    #[test]
    fn test_local_peers_counted_when_configured() {
        let probe = ReachabilityProbe::new(ReachabilityConfig {
            port: 0,
            count_local_peers: true,
        });
        assert!(probe.on_incoming_accepted("192.168.1.4:6346".parse().unwrap()));
        assert!(probe.accepted_incoming());
        assert_eq!(probe.port(), 0);
    }

    #[test]
    fn test_set_port() {
        let probe = ReachabilityProbe::new(ReachabilityConfig::default());
        probe.set_port(7000);
        assert_eq!(probe.port(), 7000);
    }
}
