//! Units of work that take part in the await/resume protocol.
//!
//! Every adapter is built on one capability, [`Action`]: run once, maybe
//! fail. Closures returning `Result<T, E>` are actions directly; closures
//! that cannot fail are wrapped in [`Infallible`].
//!
//! - [`Wrapped`] (from [`Waiter::wrap_runnable`], [`Waiter::wrap_callable`]
//!   and [`Waiter::wrap_throwing`]) resumes on success, and on failure
//!   records a diagnostic tagged with the adapter description and the
//!   executing thread before handing the failure back to whoever ran it.
//! - [`Waiter::run`], [`Waiter::call`] and [`Waiter::exec`] execute inline and
//!   turn a failure into a raw [`Waiter::rethrow`] without resuming.
//!
//! Panics are caught and recorded as [`PanicError`] causes. Wrapped adapters
//! continue unwinding afterwards so a supervising executor still sees the
//! panic.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Cause, ErrorKind, Failure, IntoCause, PanicError, ThreadTag};
use crate::render;
use crate::waiter::{Delivery, Waiter};

/// A unit of work that runs once and may fail.
pub trait Action {
    /// Value produced on success.
    type Output;

    /// Runs the action.
    fn execute(self) -> Result<Self::Output, Cause>;
}

impl<F, T, E> Action for F
where
    F: FnOnce() -> Result<T, E>,
    E: IntoCause,
{
    type Output = T;

    fn execute(self) -> Result<T, Cause> {
        self().map_err(IntoCause::into_cause)
    }
}

/// Adapts a closure that cannot return an error.
#[derive(Debug, Clone, Copy)]
pub struct Infallible<F>(pub F);

impl<F, T> Action for Infallible<F>
where
    F: FnOnce() -> T,
{
    type Output = T;

    fn execute(self) -> Result<T, Cause> {
        Ok((self.0)())
    }
}

/// An action bound to a waiter.
///
/// # Example
///
/// ```
/// use crossunit::Waiter;
/// use std::time::Duration;
///
/// let waiter = Waiter::new();
/// let task = waiter
///     .wrap_callable(|| "42".parse::<u32>())
///     .named("parse answer");
/// assert_eq!(task.description(), "Waiter.callable: parse answer");
///
/// let handle = std::thread::spawn(move || task.run());
/// assert_eq!(handle.join().unwrap().unwrap(), 42);
/// waiter.wait_timeout(Duration::from_secs(5)).unwrap();
/// ```
#[must_use = "a wrapped action does nothing until it is run"]
pub struct Wrapped<A> {
    waiter: Waiter,
    action: A,
    label: &'static str,
    origin: String,
}

impl<A: Action> Wrapped<A> {
    fn new(waiter: Waiter, action: A, label: &'static str, origin: String) -> Self {
        Self {
            waiter,
            action,
            label,
            origin,
        }
    }

    /// Replaces the origin shown in diagnostics (by default the closure's
    /// type name).
    pub fn named(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Returns the description recorded with failures.
    #[must_use]
    pub fn description(&self) -> String {
        format!("{}: {}", self.label, self.origin)
    }

    /// Runs the action on the current thread.
    ///
    /// On success the waiter is resumed and the output returned. On error
    /// the failure is recorded and returned. On panic the panic is recorded
    /// and unwinding continues.
    pub fn run(self) -> Result<A::Output, Failure> {
        let description = self.description();
        let Self {
            waiter,
            action,
            origin,
            ..
        } = self;

        match panic::catch_unwind(AssertUnwindSafe(move || action.execute())) {
            Ok(Ok(output)) => {
                waiter.resume();
                Ok(output)
            }
            Ok(Err(cause)) => Err(waiter.record(
                ErrorKind::Assertion,
                Some(&description),
                Some(cause),
                None,
                Some(&origin),
                Delivery::Wrapped,
            )),
            Err(payload) => {
                let cause = PanicError::from_payload(ThreadTag::current(), &*payload).into_cause();
                let _ = waiter.record(
                    ErrorKind::Uncaught,
                    Some(&description),
                    Some(cause),
                    None,
                    Some(&origin),
                    Delivery::Wrapped,
                );
                panic::resume_unwind(payload)
            }
        }
    }

    /// Converts into a plain closure for executors that take `FnOnce`.
    pub fn into_fn(self) -> impl FnOnce() -> Result<A::Output, Failure> {
        move || self.run()
    }
}

impl<A> fmt::Debug for Wrapped<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapped")
            .field("waiter", &self.waiter.name())
            .field("label", &self.label)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl<A> fmt::Display for Wrapped<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.origin)
    }
}

fn origin_of<F>(_: &F) -> String {
    render::type_name_of::<F>()
}

impl Waiter {
    /// Wraps a closure that returns nothing.
    pub fn wrap_runnable<F>(&self, work: F) -> Wrapped<Infallible<F>>
    where
        F: FnOnce(),
    {
        let origin = origin_of(&work);
        Wrapped::new(self.clone(), Infallible(work), "Waiter.runnable", origin)
    }

    /// Wraps a closure that returns a value or an error.
    pub fn wrap_callable<F, T, E>(&self, work: F) -> Wrapped<F>
    where
        F: FnOnce() -> Result<T, E>,
        E: IntoCause,
    {
        let origin = origin_of(&work);
        Wrapped::new(self.clone(), work, "Waiter.callable", origin)
    }

    /// Wraps a closure that may fail without producing a value.
    pub fn wrap_throwing<F, E>(&self, work: F) -> Wrapped<F>
    where
        F: FnOnce() -> Result<(), E>,
        E: IntoCause,
    {
        let origin = origin_of(&work);
        Wrapped::new(self.clone(), work, "Waiter.wrap", origin)
    }

    /// Runs `work` inline; a panic is recorded and returned as a raw
    /// rethrow.
    pub fn run(&self, work: impl FnOnce()) -> Result<(), Failure> {
        self.inline(Infallible(work))
    }

    /// Runs `work` inline and passes its value through; an error or a panic
    /// is recorded and returned as a raw rethrow.
    pub fn call<T, E: IntoCause>(&self, work: impl FnOnce() -> Result<T, E>) -> Result<T, Failure> {
        self.inline(work)
    }

    /// Runs `work` inline; an error or a panic is recorded and returned as
    /// a raw rethrow.
    pub fn exec<E: IntoCause>(&self, work: impl FnOnce() -> Result<(), E>) -> Result<(), Failure> {
        self.inline(work)
    }

    fn inline<A: Action>(&self, action: A) -> Result<A::Output, Failure> {
        match panic::catch_unwind(AssertUnwindSafe(move || action.execute())) {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(cause)) => Err(self.rethrow(cause)),
            Err(payload) => Err(self.rethrow(PanicError::from_payload(
                ThreadTag::current(),
                &*payload,
            ))),
        }
    }
}
