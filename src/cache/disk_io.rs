use std::fmt::Debug;
use std::sync::Arc;

use super::error::CacheError;
use super::reservation::{CacheHandle, CacheLimits, EntryState, EvictionPolicy, ReservationCache};
use crate::constants::DEFAULT_DISK_CACHE_BYTES;

/// Configuration for the disk I/O cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskCacheConfig {
    /// Total resident bytes across pending, verifying and committed blocks.
    pub capacity: usize,
    /// Pending blocks are in-flight writes owned by their transfers, so by
    /// default a full cache rejects instead of evicting them.
    pub policy: EvictionPolicy,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DISK_CACHE_BYTES,
            policy: EvictionPolicy::RejectWhenFull,
        }
    }
}

/// Write-behind block cache with a verifying tier.
///
/// Blocks are reserved while data arrives, move into the verifying tier while
/// their integrity check runs, and are committed once accepted. Committed
/// blocks form the write-behind queue and leave the cache when the scheduler
/// reports the flush with [`DiskIoCache::complete`].
///
/// # Examples
///
/// ```
/// use overlay_session::cache::{CacheError, DiskCacheConfig, DiskIoCache, EvictionPolicy};
///
/// let cache = DiskIoCache::new(DiskCacheConfig {
///     capacity: 1000,
///     policy: EvictionPolicy::RejectWhenFull,
/// });
///
/// let first = cache.reserve("k1", 600).unwrap();
/// assert!(matches!(
///     cache.reserve("k2", 600),
///     Err(CacheError::CapacityExceeded { .. })
/// ));
///
/// cache.evict(first).unwrap();
/// assert!(cache.reserve("k2", 600).is_ok());
/// ```
pub struct DiskIoCache<K> {
    inner: ReservationCache<K>,
}

impl<K: Clone + Debug> DiskIoCache<K> {
    pub fn new(config: DiskCacheConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: ReservationCache::new(
                "disk_io_cache",
                CacheLimits {
                    max_bytes: config.capacity,
                    max_entries: None,
                    policy: config.policy,
                },
            ),
        })
    }

    pub fn reserve(&self, key: K, size: usize) -> Result<CacheHandle, CacheError> {
        self.inner.reserve(key, size)
    }

    /// Hands a fully written block to the integrity check.
    pub fn begin_verify(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.begin_verify(handle)
    }

    pub fn commit(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.commit(handle)
    }

    /// Evicts a pending block. Verifying blocks are refused; use
    /// [`DiskIoCache::cancel`] when the owning transfer is cancelled.
    pub fn evict(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.evict(handle)
    }

    pub fn cancel(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.cancel(handle)
    }

    /// Releases a committed block after its write reached disk.
    pub fn complete(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.inner.complete(handle)
    }

    pub fn state(&self, handle: CacheHandle) -> Option<EntryState> {
        self.inner.state(handle)
    }

    pub fn key(&self, handle: CacheHandle) -> Option<K> {
        self.inner.key(handle)
    }

    pub fn size_bytes(&self) -> usize {
        self.inner.size_bytes()
    }

    pub fn verifying_size_bytes(&self) -> usize {
        self.inner.verifying_size_bytes()
    }

    /// Committed blocks waiting for their write-behind flush.
    pub fn queue_depth(&self) -> usize {
        self.inner.committed_entries()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn is_under_pressure(&self) -> bool {
        self.inner.is_under_pressure()
    }

    pub async fn wait_for_space(&self, bytes: usize) {
        self.inner.wait_for_space(bytes).await
    }
}
