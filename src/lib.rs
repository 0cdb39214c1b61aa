//! overlay-session - Session and resource accounting for overlay peer nodes
//!
//! This library owns the bookkeeping a Gnutella-style servent needs while
//! connections churn: who it is connected to and in which role, whether the
//! network lets unsolicited traffic through, how much transfer work is
//! waiting, and how much memory the caches between socket and disk hold.
//!
//! Nothing here performs network or disk I/O. The owning layers report
//! events through narrow, non-blocking calls and diagnostics pull a
//! read-only view through [`SessionInfo`].
//!
//! # Modules
//!
//! - [`connection`] - Connection registry and ultrapeer/leaf negotiation
//! - [`reachability`] - GUESS and incoming-connection latches
//! - [`demand`] - Waiting downloads, downloaders, and timeouts
//! - [`cache`] - Disk I/O, creation and content caches, buffer pool
//! - [`session`] - The session core and its diagnostics facade
//! - [`config`] - Configuration for all of the above

pub mod cache;
pub mod config;
pub mod connection;
pub mod constants;
pub mod counter;
pub mod demand;
pub mod error;
pub mod reachability;
pub mod session;

pub use cache::{
    ByteBufferPool, CacheError, CacheHandle, ContentResponseCache, CreationCache, DiskIoCache,
    EntryState, SegmentKey,
};
pub use config::{ConfigError, SessionConfig};
pub use connection::{
    Connection, ConnectionCounts, ConnectionEvent, ConnectionId, ConnectionRegistry,
    ConnectionRole, Direction, NodeRole, RegistryError, TopologyManager, UplinkCapability,
};
pub use counter::AccountingError;
pub use demand::TransferDemandTracker;
pub use error::SessionError;
pub use reachability::{ReachabilityConfig, ReachabilityProbe};
pub use session::{SessionCore, SessionInfo, SessionSnapshot};
