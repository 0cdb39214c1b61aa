use thiserror::Error;

use super::types::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id was never registered or is already closed.
    #[error("unknown connection id: {0}")]
    UnknownConnectionId(ConnectionId),
}
