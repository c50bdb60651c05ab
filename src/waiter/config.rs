//! Waiter configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`Waiter`](crate::Waiter).
///
/// # Example
///
/// ```
/// use crossunit::{Waiter, WaiterConfig};
///
/// // Collect every failure of a batch instead of stopping at the first one,
/// // and treat a short resume count as a failure on its own.
/// let config = WaiterConfig::default()
///     .with_name("batch")
///     .with_fail_fast(false)
///     .with_verify(true);
/// let waiter = Waiter::with_config(config);
/// assert_eq!(waiter.name(), "batch");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaiterConfig {
    /// Name shown in diagnostics.
    pub name: String,
    /// Once a failure is queued, later waits skip blocking entirely.
    pub fail_fast: bool,
    /// Raise at the end of a wait whenever the budget is not exactly met.
    pub verify: bool,
}

impl WaiterConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: String::new(),
            fail_fast: true,
            verify: false,
        }
    }

    /// Sets the diagnostic name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets fail-fast mode.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Sets verify mode.
    #[must_use]
    pub const fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

impl Default for WaiterConfig {
    fn default() -> Self {
        Self::new()
    }
}
