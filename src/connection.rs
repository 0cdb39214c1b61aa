//! Overlay connection accounting and topology role negotiation.
//!
//! The discovery/handshake layer reports every connection it establishes or
//! closes. The registry keeps per-(role, direction) counts that admission
//! control and diagnostics read, and publishes each change as a
//! [`ConnectionEvent`]. The [`TopologyManager`] consumes those events to
//! decide whether this node is a leaf or an ultrapeer.
//!
//! # Components
//!
//! - [`ConnectionRegistry`] - Live connections and their counts
//! - [`TopologyPolicy`] - Promotion/demotion rules
//! - [`TopologyManager`] - Runs the policy on every registry event
//! - [`UplinkCapability`] - Externally supplied uplink signal

mod error;
mod registry;
mod topology;
mod types;

pub use error::RegistryError;
pub use registry::{ConnectionEvent, ConnectionRegistry};
pub use topology::{
    NodeRole, RoleChange, TopologyConfig, TopologyManager, TopologyPolicy, UplinkBandwidth,
    UplinkCapability,
};
pub use types::{Connection, ConnectionCounts, ConnectionId, ConnectionRole, Direction};

#[cfg(test)]
mod tests;
