//! Session configuration.
//!
//! Every component takes its own config struct; [`SessionConfig`] bundles
//! them for [`SessionCore`](crate::SessionCore). All defaults come from
//! [`constants`](crate::constants).
//!
//! # Example
//!
//! ```
//! use overlay_session::config::SessionConfig;
//!
//! let mut config = SessionConfig::default();
//! config.disk_cache.capacity = 64 * 1024 * 1024;
//! config.reachability.port = 6347;
//! config.validate().unwrap();
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::cache::{BufferPoolConfig, CreationCacheConfig, DiskCacheConfig};
use crate::connection::TopologyConfig;
use crate::constants::{DEFAULT_CONTENT_RESPONSES, MAX_DISK_CACHE_BYTES};
use crate::reachability::ReachabilityConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("disk cache capacity {requested} exceeds maximum {max}")]
    DiskCacheTooLarge { requested: usize, max: usize },
}

#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub disk_cache: DiskCacheConfig,
    pub creation_cache: CreationCacheConfig,
    pub content_responses: ContentResponsesConfig,
    pub buffer_pool: BufferPoolConfig,
    pub reachability: ReachabilityConfig,
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentResponsesConfig {
    pub capacity: usize,
}

impl Default for ContentResponsesConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CONTENT_RESPONSES,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.disk_cache.capacity == 0 {
            return Err(ConfigError::Zero("disk_cache.capacity"));
        }
        if self.disk_cache.capacity > MAX_DISK_CACHE_BYTES {
            return Err(ConfigError::DiskCacheTooLarge {
                requested: self.disk_cache.capacity,
                max: MAX_DISK_CACHE_BYTES,
            });
        }
        if self.creation_cache.max_entries == 0 {
            return Err(ConfigError::Zero("creation_cache.max_entries"));
        }
        if self.creation_cache.max_bytes == 0 {
            return Err(ConfigError::Zero("creation_cache.max_bytes"));
        }
        if self.buffer_pool.block_slots == 0 {
            return Err(ConfigError::Zero("buffer_pool.block_slots"));
        }
        if self.buffer_pool.chunk_slots == 0 {
            return Err(ConfigError::Zero("buffer_pool.chunk_slots"));
        }
        if self.topology.max_failed_attempts == 0 {
            return Err(ConfigError::Zero("topology.max_failed_attempts"));
        }
        if self.topology.retry_window == Duration::ZERO {
            return Err(ConfigError::Zero("topology.retry_window"));
        }
        Ok(())
    }
}
