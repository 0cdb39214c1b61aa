use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::budget::ByteBudget;
use super::error::CacheError;

/// Lifecycle of a cache entry.
///
/// Entries only move forward: `Pending -> Verifying -> Committed`, with
/// `Verifying` optional. `Evicted` is reported for entries that have left
/// the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Reserved; data is still being written.
    Pending,
    /// Under integrity check. Only explicit cancellation removes it.
    Verifying,
    /// Accepted and queued for write-behind.
    Committed,
    /// No longer resident.
    Evicted,
}

/// What `reserve` does when a request does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict the oldest `Pending` entries until the request fits.
    #[default]
    EvictOldestPending,
    /// Fail with `CapacityExceeded` and leave every entry in place.
    RejectWhenFull,
}

/// Capacity limits for a reservation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_bytes: usize,
    pub max_entries: Option<usize>,
    pub policy: EvictionPolicy,
}

/// An opaque reference to a reserved entry.
///
/// Handles are never reused within a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheHandle(u64);

impl CacheHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Identifies a byte range of a file by content URN and offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SegmentKey {
    pub urn: String,
    pub offset: u64,
}

impl SegmentKey {
    pub fn new(urn: impl Into<String>, offset: u64) -> Self {
        Self {
            urn: urn.into(),
            offset,
        }
    }
}

struct Entry<K> {
    key: K,
    size: usize,
    state: EntryState,
}

struct Entries<K> {
    map: HashMap<u64, Entry<K>>,
    // Pending entries in reservation order, oldest first.
    pending: VecDeque<u64>,
}

impl<K> Entries<K> {
    fn leave_pending(&mut self, id: u64) {
        self.pending.retain(|p| *p != id);
    }
}

/// A byte-bounded cache of reservations with FIFO eviction over pending work.
///
/// All mutation happens under one short-held lock; sizes are mirrored into
/// atomics so readers never wait on it.
pub struct ReservationCache<K> {
    name: &'static str,
    limits: CacheLimits,
    entries: Mutex<Entries<K>>,
    budget: ByteBudget,
    next_id: AtomicU64,
    len: AtomicUsize,
    verifying_bytes: AtomicUsize,
    committed: AtomicUsize,
}

impl<K: Clone + Debug> ReservationCache<K> {
    pub fn new(name: &'static str, limits: CacheLimits) -> Self {
        Self {
            name,
            limits,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                pending: VecDeque::new(),
            }),
            budget: ByteBudget::new(limits.max_bytes),
            next_id: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            verifying_bytes: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
        }
    }

    /// Reserves `size` bytes for `key`.
    ///
    /// If the cache is full and the policy allows it, the oldest pending
    /// entries are evicted first. Nothing is evicted when the request still
    /// would not fit afterwards.
    pub fn reserve(&self, key: K, size: usize) -> Result<CacheHandle, CacheError> {
        let mut entries = self.entries.lock();

        let over_count = |len: usize| self.limits.max_entries.is_some_and(|max| len >= max);
        let needs_room = size > self.budget.available() || over_count(entries.map.len());

        if needs_room {
            let victims = self.select_victims(&*entries, size);
            let Some(victims) = victims else {
                return Err(self.capacity_exceeded(size));
            };
            for id in victims {
                if let Some(entry) = entries.map.remove(&id) {
                    entries.leave_pending(id);
                    self.budget.release(entry.size);
                    self.len.fetch_sub(1, Ordering::AcqRel);
                    debug!(
                        cache = self.name,
                        key = ?entry.key,
                        size = entry.size,
                        "evicted pending entry"
                    );
                }
            }
        }

        if !self.budget.try_reserve(size) {
            return Err(self.capacity_exceeded(size));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.map.insert(
            id,
            Entry {
                key,
                size,
                state: EntryState::Pending,
            },
        );
        entries.pending.push_back(id);
        self.len.fetch_add(1, Ordering::AcqRel);

        Ok(CacheHandle(id))
    }

    fn select_victims(&self, entries: &Entries<K>, size: usize) -> Option<Vec<u64>> {
        if size > self.limits.max_bytes || self.limits.policy == EvictionPolicy::RejectWhenFull {
            return None;
        }

        let mut available = self.budget.available();
        let mut len = entries.map.len();
        let fits = |available: usize, len: usize| {
            size <= available && self.limits.max_entries.map_or(true, |max| len < max)
        };

        let mut victims = Vec::new();
        for id in &entries.pending {
            if fits(available, len) {
                break;
            }
            if let Some(entry) = entries.map.get(id) {
                available += entry.size;
                len -= 1;
                victims.push(*id);
            }
        }

        fits(available, len).then_some(victims)
    }

    fn capacity_exceeded(&self, requested: usize) -> CacheError {
        CacheError::CapacityExceeded {
            cache: self.name,
            requested,
            available: self.budget.available(),
        }
    }

    /// Moves a pending entry into verification.
    pub fn begin_verify(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.transition(handle, EntryState::Verifying, |entries, state, size| {
            if state != EntryState::Pending {
                return Err(state);
            }
            entries.leave_pending(handle.0);
            self.verifying_bytes.fetch_add(size, Ordering::AcqRel);
            Ok(())
        })
    }

    /// Marks an entry as committed. Committed entries are never evicted.
    pub fn commit(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.transition(handle, EntryState::Committed, |entries, state, size| {
            match state {
                EntryState::Pending => entries.leave_pending(handle.0),
                EntryState::Verifying => {
                    self.verifying_bytes.fetch_sub(size, Ordering::AcqRel);
                }
                other => return Err(other),
            }
            self.committed.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    }

    /// Evicts a pending entry.
    pub fn evict(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.remove(handle, |state| state == EntryState::Pending)
    }

    /// Removes a pending or verifying entry when its transfer is cancelled.
    pub fn cancel(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.remove(handle, |state| {
            matches!(state, EntryState::Pending | EntryState::Verifying)
        })
    }

    /// Removes a committed entry once the write-behind flush has finished.
    pub fn complete(&self, handle: CacheHandle) -> Result<(), CacheError> {
        self.remove(handle, |state| state == EntryState::Committed)
    }

    fn transition<F>(
        &self,
        handle: CacheHandle,
        to: EntryState,
        apply: F,
    ) -> Result<(), CacheError>
    where
        F: FnOnce(&mut Entries<K>, EntryState, usize) -> Result<(), EntryState>,
    {
        let mut entries = self.entries.lock();
        let Some((state, size)) = entries.map.get(&handle.0).map(|e| (e.state, e.size)) else {
            return Err(self.unknown(handle));
        };

        apply(&mut *entries, state, size)
            .map_err(|from| CacheError::InvalidTransition { from, to })?;

        if let Some(entry) = entries.map.get_mut(&handle.0) {
            entry.state = to;
        }
        Ok(())
    }

    fn remove<F>(&self, handle: CacheHandle, allowed: F) -> Result<(), CacheError>
    where
        F: FnOnce(EntryState) -> bool,
    {
        let mut entries = self.entries.lock();
        let Some(state) = entries.map.get(&handle.0).map(|e| e.state) else {
            return Err(self.unknown(handle));
        };
        if !allowed(state) {
            return Err(CacheError::InvalidTransition {
                from: state,
                to: EntryState::Evicted,
            });
        }

        let Some(entry) = entries.map.remove(&handle.0) else {
            return Err(self.unknown(handle));
        };
        match entry.state {
            EntryState::Pending => entries.leave_pending(handle.0),
            EntryState::Verifying => {
                self.verifying_bytes.fetch_sub(entry.size, Ordering::AcqRel);
            }
            EntryState::Committed => {
                self.committed.fetch_sub(1, Ordering::AcqRel);
            }
            EntryState::Evicted => {}
        }
        self.len.fetch_sub(1, Ordering::AcqRel);
        self.budget.release(entry.size);
        Ok(())
    }

    fn unknown(&self, handle: CacheHandle) -> CacheError {
        debug!(cache = self.name, handle = handle.0, "unknown cache handle");
        CacheError::UnknownHandle(handle.0)
    }

    /// Returns the state of an entry, or `None` for a handle this cache never
    /// issued.
    pub fn state(&self, handle: CacheHandle) -> Option<EntryState> {
        if handle.0 >= self.next_id.load(Ordering::Relaxed) {
            return None;
        }
        let entries = self.entries.lock();
        Some(
            entries
                .map
                .get(&handle.0)
                .map_or(EntryState::Evicted, |e| e.state),
        )
    }

    pub fn key(&self, handle: CacheHandle) -> Option<K> {
        self.entries.lock().map.get(&handle.0).map(|e| e.key.clone())
    }

    pub fn size_bytes(&self) -> usize {
        self.budget.used()
    }

    pub fn verifying_size_bytes(&self) -> usize {
        self.verifying_bytes.load(Ordering::Acquire)
    }

    pub fn committed_entries(&self) -> usize {
        self.committed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.limits.max_bytes
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    pub fn is_under_pressure(&self) -> bool {
        self.budget.is_under_pressure()
    }

    /// Waits until `bytes` could be reserved without eviction, under both the
    /// byte and the entry bound.
    ///
    /// Returns immediately when the request can never fit.
    pub async fn wait_for_space(&self, bytes: usize) {
        let Some(max_entries) = self.limits.max_entries else {
            return self.budget.wait_for_space(bytes).await;
        };
        if bytes > self.limits.max_bytes || max_entries == 0 {
            return;
        }
        self.budget
            .wait_until(bytes, || self.len() < max_entries)
            .await
    }
}
