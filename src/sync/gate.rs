//! Reentrant blocking gate with timed and interruptible waits.
//!
//! The gate is either [`GateState::Blocking`] or [`GateState::Released`].
//! Any number of threads may block on it; [`Gate::release`] wakes all of
//! them. State checks and waits happen under the same mutex the releasing
//! thread takes, so a release can never fall between a waiter's check and
//! its sleep.
//!
//! # Interruption
//!
//! [`Gate::interrupt`] sets a pending interrupt and wakes all waiters. The
//! first blocked (or next blocking) caller consumes it and returns
//! [`Interrupted`].

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// Error returned when a blocked wait is interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("gate wait interrupted")]
pub struct Interrupted;

/// Observable gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// Callers of `block*` suspend.
    Blocking,
    /// Callers of `block*` return immediately.
    Released,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking => f.write_str("blocking"),
            Self::Released => f.write_str("released"),
        }
    }
}

#[derive(Debug)]
struct GateInner {
    released: bool,
    interrupted: bool,
}

impl GateInner {
    fn take_interrupt(&mut self) -> Result<(), Interrupted> {
        if self.interrupted {
            self.interrupted = false;
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Two-state latch.
#[derive(Debug)]
pub struct Gate {
    inner: Mutex<GateInner>,
    cvar: Condvar,
}

impl Gate {
    /// Creates a gate in the blocking state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                released: false,
                interrupted: false,
            }),
            cvar: Condvar::new(),
        }
    }

    /// Blocks until the gate is released.
    pub fn block(&self) -> Result<(), Interrupted> {
        let mut inner = self.inner.lock();
        loop {
            inner.take_interrupt()?;
            if inner.released {
                return Ok(());
            }
            self.cvar.wait(&mut inner);
        }
    }

    /// Blocks until the gate is released or `timeout` elapses.
    ///
    /// Returns `Ok(true)` if the gate was released in time.
    pub fn block_timeout(&self, timeout: Duration) -> Result<bool, Interrupted> {
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.inner.lock();
        loop {
            inner.take_interrupt()?;
            if inner.released {
                return Ok(true);
            }
            match deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut inner, deadline).timed_out() {
                        inner.take_interrupt()?;
                        return Ok(inner.released);
                    }
                }
                // Timeout too large to represent: behave like `block`.
                None => self.cvar.wait(&mut inner),
            }
        }
    }

    /// Releases the gate and wakes every blocked caller. Idempotent.
    pub fn release(&self) {
        let mut inner = self.inner.lock();
        if !inner.released {
            inner.released = true;
            self.cvar.notify_all();
        }
    }

    /// Puts the gate back into the blocking state. Idempotent.
    pub fn arm(&self) {
        self.inner.lock().released = false;
    }

    /// Interrupts a blocked caller, or the next one to block.
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.interrupted = true;
        self.cvar.notify_all();
    }

    /// Drops a pending interrupt, if any.
    pub fn clear_interrupt(&self) {
        self.inner.lock().interrupted = false;
    }

    /// Returns true if an interrupt is pending.
    #[must_use]
    pub fn is_interrupt_pending(&self) -> bool {
        self.inner.lock().interrupted
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> GateState {
        if self.inner.lock().released {
            GateState::Released
        } else {
            GateState::Blocking
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.state(), f)
    }
}
