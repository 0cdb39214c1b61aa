//! Accounting limits and tuning parameters.
//!
//! This module contains the defaults used throughout the session core,
//! including cache capacities, buffer size classes, and topology timings.
//!
//! The cache and connection values follow the defaults of long-running
//! Gnutella servents; the buffer classes match common block/piece sizes.

use std::time::Duration;

// ============================================================================
// Ports
// ============================================================================

/// Default Gnutella listen port
pub const DEFAULT_PORT: u16 = 6346;

// ============================================================================
// Datagram header
// ============================================================================

/// Length of the overlay message header carried in every datagram
/// (16-byte GUID, function, TTL, hops, 4-byte payload length)
pub const DATAGRAM_HEADER_LEN: usize = 23;

/// Offset of the little-endian payload length field within the header
pub const DATAGRAM_PAYLOAD_LEN_OFFSET: usize = 19;

/// Largest payload accepted as a validly formed datagram
pub const MAX_DATAGRAM_PAYLOAD: usize = 64 * 1024;

// ============================================================================
// Disk I/O cache
// ============================================================================

/// Write-behind byte cache capacity (LimeWire-era servents used 1MB per
/// controller; raised for modern disks)
pub const DEFAULT_DISK_CACHE_BYTES: usize = 16 * 1024 * 1024;

/// Upper bound on any configured disk cache
pub const MAX_DISK_CACHE_BYTES: usize = 1024 * 1024 * 1024;

// ============================================================================
// Creation cache
// ============================================================================

/// Maximum newly created segments held before persistence
pub const DEFAULT_CREATION_CACHE_ENTRIES: usize = 256;

/// Byte capacity of the creation cache
pub const DEFAULT_CREATION_CACHE_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// Content responses
// ============================================================================

/// Maximum cached content-authority responses
pub const DEFAULT_CONTENT_RESPONSES: usize = 1000;

// ============================================================================
// Buffer pool
// ============================================================================

/// Small buffer class: one transfer block
pub const BLOCK_BUFFER_SIZE: usize = 16 * 1024;

/// Large buffer class: one verification chunk
pub const CHUNK_BUFFER_SIZE: usize = 256 * 1024;

/// Pooled small buffers
pub const BLOCK_BUFFER_SLOTS: usize = 256;

/// Pooled large buffers
pub const CHUNK_BUFFER_SLOTS: usize = 16;

// ============================================================================
// Topology
// ============================================================================

/// Failed outgoing ultrapeer connections tolerated inside the retry window
/// before demoting to leaf
pub const MAX_ULTRAPEER_CONNECT_FAILURES: usize = 5;

/// Window in which failed ultrapeer connections are counted
pub const ULTRAPEER_RETRY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Buffered connection events per topology subscriber
pub const CONNECTION_EVENT_CAPACITY: usize = 256;
