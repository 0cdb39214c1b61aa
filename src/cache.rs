//! Bounded caches on the network/disk boundary.
//!
//! This module accounts for memory that transfers hold between the socket and
//! the disk. It never performs I/O itself; the transfer scheduler reports what
//! it reserved, verified, committed and flushed.
//!
//! # Overview
//!
//! - [`DiskIoCache`] - Write-behind block cache with a verifying tier
//! - [`CreationCache`] - Newly created segments awaiting persistence
//! - [`ContentResponseCache`] - Content-authority verdicts by URN
//! - [`ByteBufferPool`] - Reusable I/O buffers
//!
//! # Entry lifecycle
//!
//! Reservation caches move entries through [`EntryState`]:
//!
//! ```text
//! reserve -> Pending -> Verifying -> Committed -> complete
//!               |           |
//!             evict       cancel
//! ```
//!
//! Only pending entries are ever evicted to make room. Verifying entries are
//! mid-check and leave only through cancellation of their transfer. Committed
//! entries leave only when their flush completes.
//!
//! # Examples
//!
//! ## Backpressure
//!
//! ```
//! use overlay_session::cache::{CacheError, DiskCacheConfig, DiskIoCache};
//!
//! # async fn example() {
//! let cache = DiskIoCache::new(DiskCacheConfig::default());
//!
//! let handle = loop {
//!     match cache.reserve("urn:sha1:ABC", 16384) {
//!         Ok(handle) => break handle,
//!         Err(CacheError::CapacityExceeded { requested, .. }) => {
//!             cache.wait_for_space(requested).await;
//!         }
//!         Err(e) => panic!("{e}"),
//!     }
//! };
//! cache.begin_verify(handle).unwrap();
//! cache.commit(handle).unwrap();
//! # }
//! ```
//!
//! ## Buffers
//!
//! ```
//! use overlay_session::cache::{BufferPoolConfig, BufferUse, ByteBufferPool};
//!
//! let pool = ByteBufferPool::new(BufferPoolConfig::default());
//! let mut buf = pool.acquire_with(16384, BufferUse::Hashing);
//! buf.extend_from_slice(b"block data");
//! pool.release(buf);
//!
//! assert_eq!(pool.buffers_available(), 1);
//! ```

mod budget;
mod buffer_pool;
mod content_responses;
mod creation;
mod disk_io;
mod error;
mod reservation;

pub use budget::{ByteBudget, PRESSURE_RATIO};
pub use buffer_pool::{BufferPoolConfig, BufferUse, ByteBufferPool, PooledBuffer};
pub use content_responses::{ContentResponse, ContentResponseCache};
pub use creation::{CreationCache, CreationCacheConfig};
pub use disk_io::{DiskCacheConfig, DiskIoCache};
pub use error::CacheError;
pub use reservation::{
    CacheHandle, CacheLimits, EntryState, EvictionPolicy, ReservationCache, SegmentKey,
};
