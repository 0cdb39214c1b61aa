use std::fmt::Debug;
use std::sync::Arc;

use super::error::CacheError;
use super::reservation::{CacheHandle, CacheLimits, EntryState, EvictionPolicy, ReservationCache};
use crate::constants::{DEFAULT_CREATION_CACHE_BYTES, DEFAULT_CREATION_CACHE_ENTRIES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationCacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CreationCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CREATION_CACHE_ENTRIES,
            max_bytes: DEFAULT_CREATION_CACHE_BYTES,
        }
    }
}

/// Short-lived cache of newly created segments that are not yet persisted.
///
/// Bounded by entry count as well as bytes. When full, the oldest segment
/// that is still pending makes room for the new one; persisted (committed)
/// segments stay until [`CreationCache::complete`] releases them.
pub struct CreationCache<K> {
    inner: ReservationCache<K>,
}

impl<K: Clone + Debug> CreationCache<K> {
    pub fn new(config: CreationCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: ReservationCache::new(
                "creation_cache",
                CacheLimits {
                    max_bytes: config.max_bytes,
                    max_entries: Some(config.max_entries),
                    policy: EvictionPolicy::EvictOldestPending,
                },
            ),
        })
    }

    pub fn reserve(&self, key: K, size: usize) -> Result<CacheHandle, CacheError> {
        self.inner.reserve(key, size)
    }

    pub fn commit(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.commit(handle)
    }

    pub fn evict(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.evict(handle)
    }

    pub fn cancel(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.cancel(handle)
    }

    pub fn complete(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.complete(handle)
    }

    pub fn state(&self, handle: CacheHandle) -> Option<EntryState> {
        self.inner.state(handle)
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.size_bytes()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub async fn wait_for_space(&self, bytes: usize) {
        self.inner.wait_for_space(bytes).await
    }
}
