//! Transfer demand accounting.
//!
//! The transfer scheduler reports download and timeout lifecycle events here.
//! Nothing is owned per transfer; the tracker only keeps balanced counters.
//!
//! # Example
//!
//! ```
//! use overlay_session::TransferDemandTracker;
//!
//! let demand = TransferDemandTracker::new();
//! demand.download_waiting();
//! demand.download_started().unwrap();
//! demand.downloader_started();
//!
//! assert_eq!(demand.waiting_downloads(), 0);
//! assert_eq!(demand.individual_downloaders(), 1);
//! ```

use std::sync::Arc;

use crate::counter::{AccountingError, Gauge};

/// Counts downloads waiting to start, running downloaders, and pending
/// timeout callbacks.
#[derive(Debug)]
pub struct TransferDemandTracker {
    waiting: Gauge,
    downloaders: Gauge,
    timeouts: Gauge,
}

impl TransferDemandTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A download was queued and is waiting for a slot.
    pub fn download_waiting(&self) {
        self.waiting.increment();
    }

    /// A waiting download left the queue.
    pub fn download_started(&self) -> Result<(), AccountingError> {
        self.waiting.decrement().map(drop)
    }

    pub fn downloader_started(&self) {
        self.downloaders.increment();
    }

    pub fn downloader_finished(&self) -> Result<(), AccountingError> {
        self.downloaders.decrement().map(drop)
    }

    pub fn timeout_scheduled(&self) {
        self.timeouts.increment();
    }

    /// A scheduled timeout fired or was cancelled.
    pub fn timeout_fired(&self) -> Result<(), AccountingError> {
        self.timeouts.decrement().map(drop)
    }

    pub fn waiting_downloads(&self) -> usize {
        self.waiting.get()
    }

    pub fn individual_downloaders(&self) -> usize {
        self.downloaders.get()
    }

    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.get()
    }
}

impl Default for TransferDemandTracker {
    fn default() -> Self {
        Self {
            waiting: Gauge::new("waiting_downloads"),
            downloaders: Gauge::new("individual_downloaders"),
            timeouts: Gauge::new("pending_timeouts"),
        }
    }
}
