//! Blocking primitives underneath the await/resume protocol.
//!
//! # Primitives
//!
//! - [`Gate`]: reentrant two-state latch (blocking / released) with timed and
//!   interruptible waits
//! - [`SignalBudget`]: signed counter of outstanding expected resumes
//!
//! Neither primitive decides anything on its own; the
//! [`Waiter`](crate::Waiter) pairs budget updates with gate transitions under
//! one critical section.

mod budget;
mod gate;

pub use budget::SignalBudget;
pub use gate::{Gate, GateState, Interrupted};
