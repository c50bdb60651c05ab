//! Signed counter of outstanding expected resumes.
//!
//! The budget may go negative when more resumes arrive than were expected;
//! only its sign relative to zero matters to callers.

use std::sync::atomic::{AtomicI64, Ordering};

/// Pending-signal budget.
#[derive(Debug, Default)]
pub struct SignalBudget {
    remaining: AtomicI64,
}

impl SignalBudget {
    /// Creates an empty budget.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remaining: AtomicI64::new(0),
        }
    }

    /// Adds `expected` outstanding signals and returns the new value.
    pub fn add(&self, expected: i64) -> i64 {
        self.remaining
            .fetch_add(expected, Ordering::SeqCst)
            .wrapping_add(expected)
    }

    /// Consumes one signal and returns the new value.
    pub fn consume(&self) -> i64 {
        self.remaining.fetch_sub(1, Ordering::SeqCst).wrapping_sub(1)
    }

    /// Returns the current value.
    #[must_use]
    pub fn remaining(&self) -> i64 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Resets to zero and returns the value it held.
    pub fn reset(&self) -> i64 {
        self.remaining.swap(0, Ordering::SeqCst)
    }
}
