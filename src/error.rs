//! Error types and the failure value raised by waiter operations.
//!
//! Error handling follows these principles:
//!
//! - Every failing operation returns `Err(Failure)`; nothing panics on the
//!   caller's behalf
//! - Diagnostics are typed ([`ErrorKind`]) with structured context
//!   ([`ErrorContext`]), not sniffed out of message strings
//! - Original causes travel as [`Cause`] (`Arc<dyn Error>`) so that the same
//!   allocation can be handed back to the controller untouched
//!
//! # Error Kinds
//!
//! - **Assertion**: an assertion helper or explicit `fail*` call
//! - **Timeout**: a wait elapsed before the expected resumes arrived
//! - **Uncaught**: a worker panicked and the panic was routed to the waiter
//! - **Unverified**: verify mode found an unmet budget without a failure
//! - **Interrupted**: the blocked controller was interrupted

use core::fmt;
use std::any::Any;
use std::error::Error as StdError;
use std::sync::Arc;
use std::thread::{Thread, ThreadId};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A shared, type-erased error. Identity (the `Arc` allocation) is preserved
/// end to end, which is what makes raw rethrow and deduplication work.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Assertion helper violation or explicit failure.
    Assertion,
    /// Wait elapsed before the expected number of resumes.
    Timeout,
    /// Unhandled panic delivered from a worker thread.
    Uncaught,
    /// Verify mode: budget not satisfied although nothing failed explicitly.
    Unverified,
    /// The waiting thread was interrupted.
    Interrupted,
}

impl ErrorKind {
    /// Returns true if this kind was produced by the wait itself rather than
    /// by a recorded failure.
    #[must_use]
    pub const fn is_wait_outcome(&self) -> bool {
        matches!(self, Self::Timeout | Self::Interrupted | Self::Unverified)
    }
}

/// Identity of the thread a failure originated on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadTag {
    name: Option<String>,
    id: ThreadId,
}

impl ThreadTag {
    /// Tags the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self::of(&std::thread::current())
    }

    /// Tags the given thread.
    #[must_use]
    pub fn of(thread: &Thread) -> Self {
        Self {
            name: thread.name().map(str::to_owned),
            id: thread.id(),
        }
    }

    /// Returns the thread name, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the thread id.
    #[must_use]
    pub const fn id(&self) -> ThreadId {
        self.id
    }
}

impl fmt::Display for ThreadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Thread[{},{:?}]",
            self.name.as_deref().unwrap_or("<unnamed>"),
            self.id
        )
    }
}

/// Resume accounting captured when a wait cycle ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeTally {
    /// Resumes the wait was armed for.
    pub expected: i64,
    /// Resumes that actually arrived (`expected - remaining`).
    pub actual: i64,
    /// Budget left at evaluation time; negative after over-resume.
    pub remaining: i64,
    /// Failures queued at evaluation time.
    pub failures: usize,
    /// Wall time spent in the wait.
    pub elapsed: Duration,
    /// Timeout the wait ran with; `None` for an indefinite wait.
    pub delay: Option<Duration>,
}

/// Diagnostic context for an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The thread where the failure was recorded.
    pub thread: Option<ThreadTag>,
    /// Description of the unit of work that produced the failure.
    pub origin: Option<String>,
    /// Resume accounting, for errors produced by a wait.
    pub tally: Option<ResumeTally>,
}

/// The diagnostic error type of crossunit.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Cause>,
    context: ErrorContext,
    suppressed: Vec<Cause>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            context: ErrorContext {
                thread: None,
                origin: None,
                tally: None,
            },
            suppressed: Vec::new(),
        }
    }

    /// Creates an assertion error with a message.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion).with_message(msg)
    }

    /// Creates the timeout error for a wait that did not see enough resumes.
    #[must_use]
    pub fn timeout(tally: ResumeTally) -> Self {
        Self::new(ErrorKind::Timeout)
            .with_message(format!(
                "Test timed out while waiting for an expected result, expectedResumes: {}, actualResumes: {}, failures: {}",
                tally.expected, tally.actual, tally.failures
            ))
            .with_tally(tally)
    }

    /// Creates the error surfaced when a blocked wait is interrupted.
    #[must_use]
    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted).with_message("wait interrupted")
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Returns true if the wait was interrupted.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self.kind, ErrorKind::Interrupted)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(self, source: impl IntoCause) -> Self {
        self.with_cause(source.into_cause())
    }

    /// Adds an already shared source error to the chain, keeping its identity.
    #[must_use]
    pub fn with_cause(mut self, cause: Cause) -> Self {
        self.source = Some(cause);
        self
    }

    /// Records the originating thread.
    #[must_use]
    pub fn with_thread(mut self, thread: ThreadTag) -> Self {
        self.context.thread = Some(thread);
        self
    }

    /// Records a description of the failing unit of work.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.context.origin = Some(origin.into());
        self
    }

    /// Attaches resume accounting.
    #[must_use]
    pub fn with_tally(mut self, tally: ResumeTally) -> Self {
        self.context.tally = Some(tally);
        self
    }

    /// Attaches failures that were queued behind the reported one.
    #[must_use]
    pub fn with_suppressed(mut self, suppressed: Vec<Cause>) -> Self {
        self.suppressed = suppressed;
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the shared cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause> {
        self.source.as_ref()
    }

    /// Returns the error context.
    #[must_use]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// Returns the resume accounting, for errors produced by a wait.
    #[must_use]
    pub const fn tally(&self) -> Option<&ResumeTally> {
        self.context.tally.as_ref()
    }

    /// Returns failures that were queued behind this one in the same cycle.
    #[must_use]
    pub fn suppressed(&self) -> &[Cause] {
        &self.suppressed
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn StdError + 'static))
    }
}

/// What a failing waiter operation raises.
///
/// `Wrapped` carries a crossunit diagnostic whose source chain leads to the
/// original cause. `Raw` is the original cause itself, produced by
/// [`rethrow`](crate::Waiter::rethrow): the `Arc` is the one the caller
/// passed in, so `Arc::ptr_eq` holds and downcasting finds the concrete type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Failure {
    /// A diagnostic wrapping the cause.
    #[error(transparent)]
    Wrapped(Arc<Error>),
    /// The original cause, unwrapped.
    #[error(transparent)]
    Raw(Cause),
}

impl Failure {
    /// Returns true for a raw rethrow.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }

    /// Returns the diagnostic, unless this is a raw rethrow.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Wrapped(error) => Some(error),
            Self::Raw(_) => None,
        }
    }

    /// Returns the original cause of a raw rethrow.
    #[must_use]
    pub const fn raw(&self) -> Option<&Cause> {
        match self {
            Self::Wrapped(_) => None,
            Self::Raw(cause) => Some(cause),
        }
    }

    /// Returns the diagnostic kind, unless this is a raw rethrow.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        self.error().map(Error::kind)
    }

    /// Returns true if the wait timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == Some(ErrorKind::Timeout)
    }

    /// Returns true if the wait was interrupted.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.kind() == Some(ErrorKind::Interrupted)
    }

    /// Shares this failure as a [`Cause`] without re-wrapping it.
    #[must_use]
    pub fn to_cause(&self) -> Cause {
        match self {
            Self::Wrapped(error) => Arc::clone(error) as Cause,
            Self::Raw(cause) => Arc::clone(cause),
        }
    }

    /// Downcasts the raised value (the diagnostic or the raw cause).
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Wrapped(error) => (&**error as &(dyn StdError + 'static)).downcast_ref(),
            Self::Raw(cause) => cause.downcast_ref(),
        }
    }

    /// Returns the innermost error of the chain.
    #[must_use]
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = match self {
            Self::Wrapped(error) => &**error,
            Self::Raw(cause) => &**cause,
        };
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Self::Wrapped(Arc::new(error))
    }
}

/// Conversion into a shared [`Cause`].
///
/// Values that already are shared causes (`Cause`, `Arc<Error>`, or a
/// [`Failure`]) keep their allocation instead of being wrapped again, so
/// identity-based deduplication sees through them.
pub trait IntoCause {
    /// Converts into a shared cause.
    fn into_cause(self) -> Cause;
}

impl<E> IntoCause for E
where
    E: StdError + Send + Sync + 'static,
{
    fn into_cause(self) -> Cause {
        let any: &dyn Any = &self;
        if let Some(cause) = any.downcast_ref::<Cause>() {
            return Arc::clone(cause);
        }
        if let Some(failure) = any.downcast_ref::<Failure>() {
            return failure.to_cause();
        }
        if let Some(error) = any.downcast_ref::<Arc<Error>>() {
            return Arc::clone(error) as Cause;
        }
        Arc::new(self)
    }
}

/// An unwinding panic converted into an error value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("panicked: {message}")]
pub struct PanicError {
    thread: ThreadTag,
    message: String,
}

impl PanicError {
    /// Builds a panic error from a `catch_unwind` / `join` payload.
    #[must_use]
    pub fn from_payload(thread: ThreadTag, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "Box<dyn Any>".to_owned());
        Self { thread, message }
    }

    /// Returns the thread that panicked.
    #[must_use]
    pub const fn thread(&self) -> &ThreadTag {
        &self.thread
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl StdError for Underlying {}

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Unverified);
        assert_eq!(err.to_string(), "Unverified");
    }

    #[test]
    fn display_with_message() {
        let err = Error::assertion("assertTrue: expected true");
        assert_eq!(err.to_string(), "Assertion: assertTrue: expected true");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::assertion("outer").with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn timeout_message_carries_tally() {
        let tally = ResumeTally {
            expected: 2,
            actual: 1,
            remaining: 1,
            failures: 0,
            elapsed: Duration::from_millis(100),
            delay: Some(Duration::from_millis(100)),
        };
        let err = Error::timeout(tally);
        assert!(err.is_timeout());
        assert_eq!(err.tally(), Some(&tally));
        assert_eq!(
            err.to_string(),
            "Timeout: Test timed out while waiting for an expected result, expectedResumes: 2, actualResumes: 1, failures: 0"
        );
    }

    #[test]
    fn into_cause_keeps_shared_identity() {
        let cause: Cause = Arc::new(io::Error::other("e1"));
        let again = Arc::clone(&cause).into_cause();
        assert!(Arc::ptr_eq(&cause, &again));

        let diag = Arc::new(Error::assertion("boom"));
        let failure = Failure::Wrapped(Arc::clone(&diag));
        let shared = failure.into_cause();
        let expected: Cause = diag;
        assert!(Arc::ptr_eq(&expected, &shared));
    }

    #[test]
    fn into_cause_wraps_plain_errors() {
        let cause = io::Error::other("plain").into_cause();
        assert!(cause.downcast_ref::<io::Error>().is_some());
    }

    #[test]
    fn failure_downcasts_raw_cause() {
        let cause: Cause = Arc::new(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let failure = Failure::Raw(Arc::clone(&cause));
        assert!(failure.is_raw());
        assert_eq!(failure.kind(), None);
        let io = failure.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(io.kind(), io::ErrorKind::NotFound);
        assert!(Arc::ptr_eq(failure.raw().expect("raw"), &cause));
    }

    #[test]
    fn failure_root_cause_walks_chain() {
        let err = Error::assertion("outer").with_source(
            Error::assertion("middle").with_source(io::Error::other("root")),
        );
        let failure = Failure::from(err);
        assert_eq!(failure.root_cause().to_string(), "root");
        assert_eq!(failure.kind(), Some(ErrorKind::Assertion));
    }

    #[test]
    fn panic_payload_message_extracted() {
        let tag = ThreadTag::current();
        let payload: Box<dyn Any + Send> = Box::new("static str");
        let err = PanicError::from_payload(tag.clone(), payload.as_ref());
        assert_eq!(err.message(), "static str");
        assert_eq!(err.thread(), &tag);

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let err = PanicError::from_payload(tag, payload.as_ref());
        assert_eq!(err.to_string(), "panicked: owned");
    }

    #[test]
    fn thread_tag_renders_name_and_id() {
        let handle = std::thread::Builder::new()
            .name("worker-7".into())
            .spawn(|| ThreadTag::current().to_string())
            .expect("spawn");
        let rendered = handle.join().expect("join");
        assert!(rendered.starts_with("Thread[worker-7,ThreadId("), "{rendered}");
    }

    #[test]
    fn wait_outcome_kinds() {
        assert!(ErrorKind::Timeout.is_wait_outcome());
        assert!(ErrorKind::Interrupted.is_wait_outcome());
        assert!(!ErrorKind::Assertion.is_wait_outcome());
        assert!(!ErrorKind::Uncaught.is_wait_outcome());
    }
}
