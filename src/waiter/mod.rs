//! The await/resume protocol.
//!
//! A [`Waiter`] ties a [`Gate`], a [`SignalBudget`] and a failure sink
//! together. One controller thread calls `wait*`; any number of workers call
//! [`Waiter::resume`] or one of the failure methods.
//!
//! # Cycle
//!
//! ```text
//! DRAINED --wait_resumes(n)--> ARMED --budget <= 0 | timeout | failure--> RELEASED
//!    ^                                                                      |
//!    +-------------- reset budget, re-arm gate, drain one failure ----------+
//! ```
//!
//! The budget update and the gate transition are done under one `arming`
//! lock, on both the arming side and the resume side, so a resume can never
//! land between "budget updated" and "gate armed". Recording a failure queues
//! it and resumes under the same lock, so the cleanup at the end of a wait
//! sees either both or neither. Nothing on the failure path blocks on the
//! gate.

mod config;
mod sink;

pub use config::WaiterConfig;
pub use sink::{Delivery, FailureRecord};

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread::{JoinHandle, Thread};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::error::{Cause, Error, ErrorKind, Failure, IntoCause, PanicError, ResumeTally, ThreadTag};
use crate::render;
use crate::sync::{Gate, GateState, Interrupted, SignalBudget};
use sink::{FailureSink, Offer};

#[derive(Debug)]
struct Shared {
    config: WaiterConfig,
    gate: Gate,
    budget: SignalBudget,
    sink: FailureSink,
    arming: Mutex<()>,
}

/// How the blocking phase of a wait ended.
#[derive(Debug, Clone, Copy)]
enum Blocked {
    Released,
    /// Fail-fast short circuit: a failure was already queued.
    Skipped,
    TimedOut { actual: i64, failures: usize },
    Interrupted,
}

/// Point-in-time view of a waiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaiterStatus {
    /// Diagnostic name.
    pub name: String,
    /// Gate state.
    pub gate: GateState,
    /// Outstanding resumes; negative after over-resume.
    pub remaining: i64,
    /// Queued failures.
    pub failures: usize,
}

impl fmt::Display for WaiterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Waiter.{}: {}] Remaining: {}, Failure: {}",
            self.name, self.gate, self.remaining, self.failures
        )
    }
}

/// Cross-thread await/resume gate with failure delivery.
///
/// Cloning is cheap and every clone drives the same state, so a clone can be
/// moved into each worker thread.
#[derive(Debug, Clone)]
pub struct Waiter {
    shared: Arc<Shared>,
}

impl Waiter {
    /// Creates a waiter with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(WaiterConfig::default())
    }

    /// Creates a waiter from explicit settings.
    #[must_use]
    pub fn named(name: impl Into<String>, fail_fast: bool, verify: bool) -> Self {
        Self::with_config(
            WaiterConfig::new()
                .with_name(name)
                .with_fail_fast(fail_fast)
                .with_verify(verify),
        )
    }

    /// Creates a waiter from a configuration.
    #[must_use]
    pub fn with_config(config: WaiterConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                gate: Gate::new(),
                budget: SignalBudget::new(),
                sink: FailureSink::new(),
                arming: Mutex::new(()),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &WaiterConfig {
        &self.shared.config
    }

    /// Returns the diagnostic name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    /// Waits indefinitely for one resume.
    pub fn wait(&self) -> Result<(), Failure> {
        self.wait_resumes(Duration::ZERO, 1)
    }

    /// Waits up to `delay` for one resume. `Duration::ZERO` waits
    /// indefinitely.
    pub fn wait_timeout(&self, delay: Duration) -> Result<(), Failure> {
        self.wait_resumes(delay, 1)
    }

    /// Waits up to `delay` for `expected` resumes. `Duration::ZERO` waits
    /// indefinitely.
    ///
    /// An interruption or a timeout is raised with its own kind; a failure
    /// drained in the same cycle (or, in verify mode, the unmet budget) is
    /// attached as its source. Otherwise the first failure recorded during
    /// the cycle is raised. Whatever the outcome, the budget is reset, the
    /// gate is re-armed and the failure queue is empty afterwards.
    pub fn wait_resumes(&self, delay: Duration, expected: u32) -> Result<(), Failure> {
        let started = Instant::now();
        let expected = i64::from(expected);

        let blocked = if self.shared.config.fail_fast && !self.shared.sink.is_empty() {
            debug!(waiter = %self.name(), "failure already queued, skipping wait");
            Blocked::Skipped
        } else {
            self.arm(expected);
            self.block(delay, expected)
        };

        self.conclude(started, delay, expected, blocked)
    }

    fn arm(&self, expected: i64) {
        let _arming = self.shared.arming.lock();
        let remaining = self.shared.budget.add(expected);
        if remaining > 0 {
            self.shared.gate.arm();
            debug!(waiter = %self.name(), expected, remaining, "gate armed");
        } else {
            self.shared.gate.release();
            debug!(waiter = %self.name(), expected, remaining, "budget already met");
        }
    }

    fn block(&self, delay: Duration, expected: i64) -> Blocked {
        let gate = &self.shared.gate;
        let released = if delay.is_zero() {
            gate.block().map(|()| true)
        } else {
            gate.block_timeout(delay)
        };
        match released {
            Ok(true) => Blocked::Released,
            Ok(false) => Blocked::TimedOut {
                actual: expected - self.shared.budget.remaining(),
                failures: self.shared.sink.len(),
            },
            Err(Interrupted) => Blocked::Interrupted,
        }
    }

    fn conclude(
        &self,
        started: Instant,
        delay: Duration,
        expected: i64,
        blocked: Blocked,
    ) -> Result<(), Failure> {
        let elapsed = started.elapsed();
        let (gate, remaining, drained, rest) = {
            let _arming = self.shared.arming.lock();
            let gate = self.shared.gate.state();
            let remaining = self.shared.budget.reset();
            self.shared.gate.arm();
            let drained = self.shared.sink.poll();
            (gate, remaining, drained, self.shared.sink.drain())
        };

        let failures = rest.len();
        let tally = ResumeTally {
            expected,
            actual: expected - remaining,
            remaining,
            failures,
            elapsed,
            delay: (!delay.is_zero()).then_some(delay),
        };
        let outcome = match blocked {
            Blocked::Released | Blocked::Skipped => None,
            Blocked::TimedOut { actual, failures } => Some(Error::timeout(ResumeTally {
                actual,
                failures,
                ..tally
            })),
            Blocked::Interrupted => Some(Error::interrupted().with_tally(tally)),
        };
        let unverified = self.shared.config.verify && remaining != 0;

        let composite = (drained.is_some() || unverified).then(|| {
            self.composite(gate, &tally, drained.as_ref(), &rest)
        });

        if let Some(outcome) = outcome {
            let outcome = match composite {
                Some(composite) => outcome.with_source(composite),
                None => outcome,
            };
            debug!(waiter = %self.name(), error = %render::chain(&outcome), "wait aborted");
            return Err(outcome.into());
        }

        let Some(composite) = composite else {
            debug!(waiter = %self.name(), expected, remaining, ?elapsed, "wait cycle complete");
            return Ok(());
        };
        match drained.as_ref().and_then(FailureRecord::raw_cause) {
            Some(cause) => Err(Failure::Raw(cause)),
            None => Err(composite.into()),
        }
    }

    /// Builds and logs the `[Waiter.<name>.await: ..]` report for a failed
    /// cycle.
    fn composite(
        &self,
        gate: GateState,
        tally: &ResumeTally,
        drained: Option<&FailureRecord>,
        rest: &[FailureRecord],
    ) -> Error {
        let kind = drained.map_or(ErrorKind::Unverified, |record| record.diagnostic().kind());
        let message = format!(
            "[Waiter.{}.await: {gate}] Expected: {}, Actual: {}, Remaining: {}, Failure: {}, Sum A+F: {}, Time: {:?} : {}",
            self.name(),
            tally.expected,
            tally.actual,
            tally.remaining,
            tally.failures,
            tally
                .actual
                .saturating_add(i64::try_from(tally.failures).unwrap_or(i64::MAX)),
            tally.elapsed,
            tally
                .delay
                .map_or_else(|| "indefinite".to_owned(), |delay| format!("{delay:?}")),
        );
        let mut composite = Error::new(kind).with_message(message).with_tally(*tally);
        if let Some(record) = drained {
            composite = composite.with_cause(record.payload());
        }

        error!(waiter = %self.name(), statistics = %render::chain(&composite), "wait failed");
        for (index, record) in drained.into_iter().chain(rest).enumerate() {
            error!(
                waiter = %self.name(),
                index = index + 1,
                failure = %render::chain(&*record.payload()),
                "queued failure"
            );
        }
        composite.with_suppressed(rest.iter().map(FailureRecord::payload).collect())
    }

    /// Signals one completion. Over-resuming is tolerated.
    pub fn resume(&self) {
        self.signal(false);
    }

    fn signal(&self, release: bool) {
        let _arming = self.shared.arming.lock();
        self.signal_locked(release);
    }

    /// Consumes one resume; the caller holds the arming lock.
    fn signal_locked(&self, release: bool) {
        let remaining = self.shared.budget.consume();
        trace!(waiter = %self.name(), remaining, "resume");
        if release || remaining <= 0 {
            self.shared.gate.release();
            debug!(waiter = %self.name(), remaining, "gate released");
        }
    }

    /// Records a failure with a message and returns the diagnostic to raise.
    ///
    /// The failure is delivered to the controller at its next wait; the
    /// caller is expected to propagate the returned value as well.
    #[must_use = "the failure should be propagated by the caller too"]
    pub fn fail(&self, message: impl fmt::Display) -> Failure {
        self.record(ErrorKind::Assertion, Some(&render::line(&message)), None, None, None, Delivery::Wrapped)
    }

    /// Records a failure caused by `cause`, wrapped in a diagnostic.
    #[must_use = "the failure should be propagated by the caller too"]
    pub fn fail_cause(&self, cause: impl IntoCause) -> Failure {
        self.record(ErrorKind::Assertion, None, Some(cause.into_cause()), None, None, Delivery::Wrapped)
    }

    /// Records a failure with both a message and a cause.
    #[must_use = "the failure should be propagated by the caller too"]
    pub fn fail_with(&self, message: impl fmt::Display, cause: impl IntoCause) -> Failure {
        self.record(
            ErrorKind::Assertion,
            Some(&render::line(&message)),
            Some(cause.into_cause()),
            None,
            None,
            Delivery::Wrapped,
        )
    }

    /// Records `cause` so that the controller receives the cause itself
    /// rather than a diagnostic, and returns it.
    ///
    /// ```
    /// use crossunit::Waiter;
    /// use std::io;
    /// use std::sync::Arc;
    ///
    /// let waiter = Waiter::new();
    /// let cause: crossunit::Cause = Arc::new(io::Error::other("disk"));
    /// let raised = waiter.rethrow(Arc::clone(&cause));
    /// assert!(Arc::ptr_eq(raised.raw().unwrap(), &cause));
    /// ```
    #[must_use = "the failure should be propagated by the caller too"]
    pub fn rethrow(&self, cause: impl IntoCause) -> Failure {
        self.record(ErrorKind::Assertion, None, Some(cause.into_cause()), None, None, Delivery::Raw)
    }

    /// Routes a panic payload from `thread` into the failure path.
    pub fn uncaught(&self, thread: &Thread, payload: &(dyn Any + Send)) -> Failure {
        let tag = ThreadTag::of(thread);
        let cause = PanicError::from_payload(tag.clone(), payload).into_cause();
        self.record(
            ErrorKind::Uncaught,
            Some(&format!("Uncaught panic! In thread: {tag}")),
            Some(cause),
            Some(tag),
            None,
            Delivery::Wrapped,
        )
    }

    /// Runs a worker body, routing a panic into [`Waiter::uncaught`].
    ///
    /// Returns `None` if the body panicked.
    pub fn catch_uncaught<T>(&self, body: impl FnOnce() -> T) -> Option<T> {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)) {
            Ok(value) => Some(value),
            Err(payload) => {
                // Queued for the controller; the caller only learns of the panic.
                let _queued = self.uncaught(&std::thread::current(), &*payload);
                None
            }
        }
    }

    /// Joins a worker, routing a panic into [`Waiter::uncaught`].
    pub fn report_join<T>(&self, handle: JoinHandle<T>) -> Option<T> {
        let thread = handle.thread().clone();
        match handle.join() {
            Ok(value) => Some(value),
            Err(payload) => {
                // Queued for the controller; the caller only learns of the panic.
                let _queued = self.uncaught(&thread, &*payload);
                None
            }
        }
    }

    /// Builds, deduplicates and queues a failure record, resuming once when
    /// the record is new.
    pub(crate) fn record(
        &self,
        kind: ErrorKind,
        message: Option<&str>,
        cause: Option<Cause>,
        thread: Option<ThreadTag>,
        origin: Option<&str>,
        delivery: Delivery,
    ) -> Failure {
        // Already a crossunit diagnostic: queue the caller's allocation itself.
        if let Some(cause) = &cause {
            if let Some(diagnostic) = cause.downcast_ref::<Error>() {
                let record = FailureRecord::reoffered(
                    Arc::new(diagnostic.clone()),
                    Arc::clone(cause),
                    delivery,
                );
                self.enqueue(&record, cause);
                return record.into_failure();
            }
        }

        let thread = thread.unwrap_or_else(ThreadTag::current);
        let message = message.unwrap_or_default();
        let rendered = cause
            .as_deref()
            .map(|cause| render::chain(cause))
            .unwrap_or_default();
        let mut text = match (message.is_empty(), rendered.is_empty()) {
            (true, _) => rendered,
            (false, true) => message.to_owned(),
            (false, false) => format!("{message} <= {rendered}"),
        };
        let tag = thread.to_string();
        if !text.contains(&tag) {
            text.push_str("\t# Thread: ");
            text.push_str(&tag);
        }
        if let Some(origin) = origin {
            if !text.contains(origin) {
                text.push_str("\t@ ");
                text.push_str(origin);
            }
        }

        let mut diagnostic = Error::new(kind).with_message(text).with_thread(thread);
        if let Some(origin) = origin {
            diagnostic = diagnostic.with_origin(origin);
        }
        if let Some(cause) = &cause {
            diagnostic = diagnostic.with_cause(Arc::clone(cause));
        }
        let record = FailureRecord::new(Arc::new(diagnostic), delivery);
        match &cause {
            Some(cause) => self.enqueue(&record, cause),
            None => self.enqueue_new(record.clone()),
        }
        record.into_failure()
    }

    fn enqueue(&self, record: &FailureRecord, cause: &Cause) {
        let _arming = self.shared.arming.lock();
        match self.shared.sink.offer(record.clone(), Some(cause)) {
            Offer::Queued => self.recorded(record),
            Offer::Duplicate(existing) => {
                debug!(
                    waiter = %self.name(),
                    existing = %existing.diagnostic(),
                    "cause already recorded"
                );
            }
        }
    }

    fn enqueue_new(&self, record: FailureRecord) {
        let _arming = self.shared.arming.lock();
        let queued = record.clone();
        if matches!(self.shared.sink.offer(record, None), Offer::Queued) {
            self.recorded(&queued);
        }
    }

    fn recorded(&self, record: &FailureRecord) {
        warn!(
            waiter = %self.name(),
            kind = ?record.diagnostic().kind(),
            delivery = ?record.delivery(),
            failure = %record.diagnostic(),
            "failure recorded"
        );
        // In fail-fast mode a failure ends the cycle whatever the budget says.
        self.signal_locked(self.shared.config.fail_fast);
    }

    /// Interrupts the controller blocked in `wait*`, or the next wait if
    /// nobody is blocked.
    pub fn interrupt(&self) {
        debug!(waiter = %self.name(), "interrupt requested");
        self.shared.gate.interrupt();
    }

    /// Clears the budget, the failure queue and any pending interrupt, and
    /// re-arms the gate.
    pub fn reset(&self) {
        let _arming = self.shared.arming.lock();
        self.shared.budget.reset();
        self.shared.sink.clear();
        self.shared.gate.clear_interrupt();
        self.shared.gate.arm();
        debug!(waiter = %self.name(), "reset");
    }

    /// Returns the outstanding resume count.
    #[must_use]
    pub fn remaining_resumes(&self) -> i64 {
        self.shared.budget.remaining()
    }

    /// Returns the number of queued failures.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.shared.sink.len()
    }

    /// Returns a snapshot of the queued failures, oldest first.
    #[must_use]
    pub fn pending_failures(&self) -> Vec<FailureRecord> {
        self.shared.sink.snapshot()
    }

    /// Returns the gate state.
    #[must_use]
    pub fn gate_state(&self) -> GateState {
        self.shared.gate.state()
    }

    /// Returns a point-in-time status.
    #[must_use]
    pub fn status(&self) -> WaiterStatus {
        WaiterStatus {
            name: self.name().to_owned(),
            gate: self.gate_state(),
            remaining: self.remaining_resumes(),
            failures: self.failure_count(),
        }
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Waiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.status(), f)
    }
}
