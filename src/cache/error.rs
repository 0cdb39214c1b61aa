use thiserror::Error;

use super::reservation::EntryState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("{cache} capacity exceeded: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        cache: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("unknown cache handle: {0}")]
    UnknownHandle(u64),

    #[error("invalid cache entry transition from {from:?} to {to:?}")]
    InvalidTransition { from: EntryState, to: EntryState },
}
