use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Fraction of the limit above which a budget reports pressure.
pub const PRESSURE_RATIO: f32 = 0.9;

/// Byte accounting for one cache.
///
/// Reservations never exceed the limit. Releasing bytes wakes every task
/// parked in [`ByteBudget::wait_for_space`], which is how the I/O scheduler
/// learns that a failed reservation is worth retrying.
#[derive(Debug)]
pub struct ByteBudget {
    limit: usize,
    used: AtomicUsize,
    freed: Notify,
}

impl ByteBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
            freed: Notify::new(),
        }
    }

    pub fn try_reserve(&self, bytes: usize) -> bool {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            if current + bytes > self.limit {
                return false;
            }
            match self.used.compare_exchange_weak(
                current,
                current + bytes,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns bytes to the budget. Wakes waiters on every call, including
    /// zero-byte releases.
    pub fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
        self.freed.notify_waiters();
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn available(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }

    pub fn is_under_pressure(&self) -> bool {
        self.used() > (self.limit as f32 * PRESSURE_RATIO) as usize
    }

    /// Waits until at least `bytes` are free.
    ///
    /// Returns immediately when the request can never fit, so the caller's
    /// next reservation fails fast instead of parking forever.
    pub async fn wait_for_space(&self, bytes: usize) {
        if bytes > self.limit {
            return;
        }
        self.wait_until(bytes, || true).await
    }

    /// Waits until at least `bytes` are free and `ready` holds, re-checking
    /// both after every release.
    pub async fn wait_until<F>(&self, bytes: usize, mut ready: F)
    where
        F: FnMut() -> bool,
    {
        loop {
            let mut notified = pin!(self.freed.notified());
            notified.as_mut().enable();
            if self.available() >= bytes && ready() {
                return;
            }
            notified.await;
        }
    }
}
