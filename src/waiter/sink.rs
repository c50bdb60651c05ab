//! Ordered failure queue with cause-chain deduplication.
//!
//! A cause is recorded at most once. Before queueing, the sink walks the
//! source chain of every queued record and compares each link (by
//! allocation address) against the incoming cause and against the incoming
//! cause's own source. The check and the insert happen under one lock.

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Cause, Error, Failure, ThreadTag};

/// How a recorded failure is raised when it is drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Raise the diagnostic that wraps the cause.
    Wrapped,
    /// Raise the original cause itself.
    Raw,
}

/// A captured failure.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    diagnostic: Arc<Error>,
    delivery: Delivery,
    /// Shared value this record was re-offered as, when the diagnostic is a
    /// copy of an existing crossunit error.
    alias: Option<Cause>,
}

impl FailureRecord {
    pub(crate) const fn new(diagnostic: Arc<Error>, delivery: Delivery) -> Self {
        Self {
            diagnostic,
            delivery,
            alias: None,
        }
    }

    pub(crate) const fn reoffered(diagnostic: Arc<Error>, alias: Cause, delivery: Delivery) -> Self {
        Self {
            diagnostic,
            delivery,
            alias: Some(alias),
        }
    }

    /// Returns the diagnostic.
    #[must_use]
    pub const fn diagnostic(&self) -> &Arc<Error> {
        &self.diagnostic
    }

    /// Returns how this record is raised.
    #[must_use]
    pub const fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Returns the original cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Cause> {
        Error::cause(&self.diagnostic)
    }

    /// Returns the error object that was queued.
    ///
    /// For a crossunit error offered again this is the caller's own
    /// allocation, otherwise the diagnostic built for it.
    #[must_use]
    pub fn payload(&self) -> Cause {
        self.alias
            .as_ref()
            .map_or_else(|| Arc::clone(&self.diagnostic) as Cause, Arc::clone)
    }

    /// Returns the thread the failure was recorded on.
    #[must_use]
    pub fn thread(&self) -> Option<&ThreadTag> {
        self.diagnostic.context().thread.as_ref()
    }

    /// Converts into the value raised for this record.
    #[must_use]
    pub fn into_failure(self) -> Failure {
        match self.raw_cause() {
            Some(cause) => Failure::Raw(cause),
            None => Failure::Wrapped(self.diagnostic),
        }
    }

    /// The value a raw record raises, if this record is raw.
    pub(crate) fn raw_cause(&self) -> Option<Cause> {
        if self.delivery != Delivery::Raw {
            return None;
        }
        self.alias
            .clone()
            .or_else(|| Error::cause(&self.diagnostic).cloned())
    }

    /// Returns true if `cause` is already represented by this record.
    pub(crate) fn covers(&self, cause: &(dyn StdError + 'static)) -> bool {
        let target = addr(cause);
        let target_source = cause.source().map(addr);

        if let Some(alias) = &self.alias {
            if addr(&**alias) == target {
                return true;
            }
        }

        let mut link: Option<&(dyn StdError + 'static)> = Some(&*self.diagnostic);
        while let Some(err) = link {
            let at = addr(err);
            if at == target || target_source == Some(at) {
                return true;
            }
            link = err.source();
        }
        false
    }
}

fn addr(err: &(dyn StdError + 'static)) -> *const () {
    (err as *const dyn StdError).cast::<()>()
}

/// Result of offering a record to the sink.
#[derive(Debug)]
pub(crate) enum Offer {
    /// The record was appended.
    Queued,
    /// The cause was already present; nothing was appended.
    Duplicate(FailureRecord),
}

#[derive(Debug, Default)]
pub(crate) struct FailureSink {
    queue: Mutex<VecDeque<FailureRecord>>,
}

impl FailureSink {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `record` unless `cause` is already covered by a queued record.
    pub(crate) fn offer(&self, record: FailureRecord, cause: Option<&Cause>) -> Offer {
        let mut queue = self.queue.lock();
        if let Some(cause) = cause {
            let cause: &(dyn StdError + 'static) = &**cause;
            if let Some(existing) = queue.iter().find(|queued| queued.covers(cause)) {
                return Offer::Duplicate(existing.clone());
            }
        }
        queue.push_back(record);
        Offer::Queued
    }

    pub(crate) fn poll(&self) -> Option<FailureRecord> {
        self.queue.lock().pop_front()
    }

    pub(crate) fn drain(&self) -> Vec<FailureRecord> {
        self.queue.lock().drain(..).collect()
    }

    pub(crate) fn clear(&self) {
        self.queue.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<FailureRecord> {
        self.queue.lock().iter().cloned().collect()
    }
}
