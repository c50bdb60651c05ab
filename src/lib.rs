//! Crossunit: cross-thread assertion delivery for concurrent tests.
//!
//! # Overview
//!
//! A plain `assert!` inside a spawned thread only kills that thread; the test
//! thread never hears about it. Crossunit gives the controlling thread a
//! [`Waiter`] that blocks until workers report completion (via
//! [`Waiter::resume`]) or failure (via [`Waiter::fail`] and friends), and then
//! re-raises the first captured failure with its original diagnostic.
//!
//! # Core Guarantees
//!
//! - **No lost wakeups**: arming and releasing the gate happen under one
//!   critical section with the budget update
//! - **Failures always unblock**: every recorded failure counts as a resume
//! - **Exactly-once delivery**: a cause is queued once, drained once, and the
//!   sink is empty after every failing wait
//! - **Type-preserving rethrow**: [`Waiter::rethrow`] hands back the very same
//!   `Arc` it was given, so callers can downcast to the concrete error type
//! - **Reusable**: every wait cycle re-arms the gate; [`Waiter::reset`]
//!   restores a freshly constructed state
//!
//! # Module Structure
//!
//! - [`sync`]: gate and signal budget primitives
//! - [`waiter`]: the await/resume protocol, failure sink and configuration
//! - [`action`]: adapters that turn closures into resume/fail signals
//! - [`assert`]: assertion helpers routed through the failure path
//! - [`error`]: error types and the [`Failure`] raised by every operation
//! - [`render`]: single-line rendering helpers used in diagnostics
//!
//! # Example
//!
//! ```
//! use crossunit::Waiter;
//! use std::time::Duration;
//!
//! let waiter = Waiter::new();
//! let worker = waiter.clone();
//! std::thread::spawn(move || {
//!     let _ = worker.assert_equals(&4, &(2 + 2));
//!     worker.resume();
//! });
//! waiter.wait_timeout(Duration::from_secs(5)).expect("worker failed");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod action;
pub mod assert;
pub mod error;
pub mod render;
pub mod sync;
pub mod waiter;

#[cfg(test)]
pub(crate) mod test_utils;

pub use action::{Action, Infallible, Wrapped};
pub use assert::Matcher;
pub use error::{
    Cause, Error, ErrorContext, ErrorKind, Failure, IntoCause, PanicError, ResumeTally,
    ThreadTag,
};
pub use sync::{Gate, GateState, Interrupted, SignalBudget};
pub use waiter::{Delivery, FailureRecord, Waiter, WaiterConfig, WaiterStatus};
