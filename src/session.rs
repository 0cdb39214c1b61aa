//! The session core and its diagnostics facade.
//!
//! [`SessionCore`] owns every accounting component of a running node and
//! hands out their handles. [`SessionInfo`] is the read-only view the
//! diagnostics layer consumes; [`SessionSnapshot`] is a captured copy of it.

mod info;
mod node;

pub use info::{SessionInfo, SessionSnapshot};
pub use node::SessionCore;
