//! Non-negative atomic counters.
//!
//! Counters are diagnostics and admission-control signals. A decrement
//! below zero means a caller paired its events wrongly: debug builds panic so
//! the mistake surfaces in tests, release builds clamp at zero and report
//! the underflow to the caller.

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Errors raised by the demand and socket counters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountingError {
    /// A counter was decremented while already at zero.
    #[error("counter underflow: {counter}")]
    CounterUnderflow {
        /// Name of the counter that underflowed.
        counter: &'static str,
    },
}

/// A named counter that never goes below zero.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
    value: AtomicUsize,
}

impl Gauge {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn increment(&self) -> usize {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the counter, clamping at zero.
    ///
    /// Returns the new value, or `CounterUnderflow` if the counter was already
    /// zero. In debug builds an underflow panics.
    pub fn decrement(&self) -> Result<usize, AccountingError> {
        let result = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));

        match result {
            Ok(previous) => Ok(previous - 1),
            Err(_) => {
                debug_assert!(false, "counter underflow: {}", self.name);
                tracing::warn!(counter = self.name, "counter decremented below zero, clamped");
                Err(AccountingError::CounterUnderflow { counter: self.name })
            }
        }
    }

    pub fn get(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }
}
