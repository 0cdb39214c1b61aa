use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::constants::{
    BLOCK_BUFFER_SIZE, BLOCK_BUFFER_SLOTS, CHUNK_BUFFER_SIZE, CHUNK_BUFFER_SLOTS,
};

/// What a buffer is acquired for. Decides whether it is zeroed on release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUse {
    /// General network or disk I/O; zeroed when the pool policy says so.
    #[default]
    Io,
    /// Content hashing input; never zeroed.
    Hashing,
    /// Key material or other secrets; always zeroed.
    Sensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    pub block_slots: usize,
    pub chunk_slots: usize,
    /// Zero general I/O buffers on release.
    pub zero_io_buffers: bool,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            block_slots: BLOCK_BUFFER_SLOTS,
            chunk_slots: CHUNK_BUFFER_SLOTS,
            zero_io_buffers: false,
        }
    }
}

/// A buffer borrowed from a [`ByteBufferPool`].
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    zero_on_release: bool,
}

impl PooledBuffer {
    pub fn zero_on_release(&self) -> bool {
        self.zero_on_release
    }

    pub fn into_inner(self) -> BytesMut {
        self.buf
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

/// Reusable buffers in two size classes: transfer blocks and verification
/// chunks. Requests larger than a chunk are allocated fresh and not pooled.
pub struct ByteBufferPool {
    block_buffers: ArrayQueue<BytesMut>,
    chunk_buffers: ArrayQueue<BytesMut>,
    bytes_held: AtomicUsize,
    zero_io_buffers: bool,
}

impl ByteBufferPool {
    pub fn new(config: BufferPoolConfig) -> Arc<Self> {
        Arc::new(Self::with_config(config))
    }

    /// A class configured with zero slots still keeps one buffer.
    fn with_config(config: BufferPoolConfig) -> Self {
        Self {
            block_buffers: ArrayQueue::new(config.block_slots.max(1)),
            chunk_buffers: ArrayQueue::new(config.chunk_slots.max(1)),
            bytes_held: AtomicUsize::new(0),
            zero_io_buffers: config.zero_io_buffers,
        }
    }

    /// Acquires a general I/O buffer with at least `size` bytes of capacity.
    pub fn acquire(&self, size: usize) -> PooledBuffer {
        self.acquire_with(size, BufferUse::Io)
    }

    pub fn acquire_with(&self, size: usize, usage: BufferUse) -> PooledBuffer {
        let zero_on_release = match usage {
            BufferUse::Io => self.zero_io_buffers,
            BufferUse::Hashing => false,
            BufferUse::Sensitive => true,
        };

        let pooled = match size {
            s if s <= BLOCK_BUFFER_SIZE => self.block_buffers.pop(),
            s if s <= CHUNK_BUFFER_SIZE => self.chunk_buffers.pop(),
            _ => None,
        };

        let buf = match pooled {
            Some(buf) => {
                self.bytes_held.fetch_sub(buf.capacity(), Ordering::AcqRel);
                buf
            }
            None => BytesMut::with_capacity(class_size(size)),
        };

        PooledBuffer {
            buf,
            zero_on_release,
        }
    }

    /// Returns a buffer to the pool. Buffers that fit no class, or arrive
    /// while their class is full, are dropped.
    pub fn release(&self, buffer: PooledBuffer) {
        let PooledBuffer {
            mut buf,
            zero_on_release,
        } = buffer;

        if zero_on_release {
            buf.clear();
            buf.resize(buf.capacity(), 0);
        }
        buf.clear();

        let capacity = buf.capacity();
        let queue = if (BLOCK_BUFFER_SIZE..CHUNK_BUFFER_SIZE).contains(&capacity) {
            &self.block_buffers
        } else if (CHUNK_BUFFER_SIZE..2 * CHUNK_BUFFER_SIZE).contains(&capacity) {
            &self.chunk_buffers
        } else {
            return;
        };

        if queue.push(buf).is_ok() {
            self.bytes_held.fetch_add(capacity, Ordering::AcqRel);
        }
    }

    /// Bytes held by idle pooled buffers.
    pub fn bytes_held(&self) -> usize {
        self.bytes_held.load(Ordering::Acquire)
    }

    pub fn buffers_available(&self) -> usize {
        self.block_buffers.len() + self.chunk_buffers.len()
    }
}

impl Default for ByteBufferPool {
    fn default() -> Self {
        Self::with_config(BufferPoolConfig::default())
    }
}

fn class_size(size: usize) -> usize {
    if size <= BLOCK_BUFFER_SIZE {
        BLOCK_BUFFER_SIZE
    } else if size <= CHUNK_BUFFER_SIZE {
        CHUNK_BUFFER_SIZE
    } else {
        size
    }
}
