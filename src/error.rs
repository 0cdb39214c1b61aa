use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::connection::RegistryError;
use crate::counter::AccountingError;

/// Any error surfaced by the session core.
///
/// None of these are fatal to the node; each is returned to the caller that
/// triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("accounting error: {0}")]
    Accounting(#[from] AccountingError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
