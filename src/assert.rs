//! Assertion helpers that report through the waiter.
//!
//! Each helper is a plain predicate. On violation it records the failure
//! (which also resumes the waiter) and returns it, so a worker can write
//! `waiter.assert_true(ok)?` and the controller still sees the failure at
//! its next wait.

use std::any::TypeId;
use std::error::Error as StdError;
use std::fmt::{Debug, Display};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{Cause, Error, Failure, PanicError, ThreadTag};
use crate::render;
use crate::waiter::Waiter;

/// An external predicate over values of type `T`.
///
/// `Err` carries the text describing the mismatch.
pub trait Matcher<T: ?Sized> {
    /// Checks `actual`.
    fn check(&self, actual: &T) -> Result<(), String>;
}

impl<T, F> Matcher<T> for F
where
    T: ?Sized,
    F: Fn(&T) -> Result<(), String>,
{
    fn check(&self, actual: &T) -> Result<(), String> {
        self(actual)
    }
}

impl Waiter {
    /// Fails unless `expected == actual`. Returns `Ok(true)` on success.
    pub fn assert_equals<E, A>(&self, expected: &E, actual: &A) -> Result<bool, Failure>
    where
        E: PartialEq<A> + Debug + ?Sized,
        A: Debug + ?Sized,
    {
        if expected == actual {
            Ok(true)
        } else {
            Err(self.fail(render::expected_actual(expected, actual, "assertEquals")))
        }
    }

    /// Fails unless `condition` holds.
    pub fn assert_true(&self, condition: bool) -> Result<(), Failure> {
        if condition {
            Ok(())
        } else {
            Err(self.fail("assertTrue: expected true"))
        }
    }

    /// Fails if `condition` holds.
    pub fn assert_false(&self, condition: bool) -> Result<(), Failure> {
        if condition {
            Err(self.fail("assertFalse: expected false"))
        } else {
            Ok(())
        }
    }

    /// Fails if `value` is `None`; returns the contained value otherwise.
    pub fn assert_some<'a, T>(&self, value: &'a Option<T>) -> Result<&'a T, Failure> {
        value
            .as_ref()
            .ok_or_else(|| self.fail("assertNotNull: expected not null"))
    }

    /// Fails if `value` is `Some`.
    pub fn assert_none<T: Debug>(&self, value: &Option<T>) -> Result<(), Failure> {
        if value.is_none() {
            Ok(())
        } else {
            Err(self.fail(render::expected_actual(&None::<T>, value, "assertNull")))
        }
    }

    /// Fails unless the rendered form of `actual` starts with `prefix`;
    /// returns `actual` unchanged for chaining.
    ///
    /// ```
    /// use crossunit::Waiter;
    ///
    /// let waiter = Waiter::new();
    /// let port = waiter.assert_starts_with("80", Some(8080)).unwrap();
    /// assert_eq!(port, 8080);
    /// assert!(waiter.assert_starts_with("", Some(1)).is_err());
    /// ```
    pub fn assert_starts_with<T: Display>(&self, prefix: &str, actual: Option<T>) -> Result<T, Failure> {
        let Some(actual) = actual else {
            return Err(self.fail(render::expected_actual(prefix, "None", "assertStartsWith")));
        };
        let rendered = render::line(&actual);
        if prefix.is_empty() {
            return Err(self.fail(format!(
                "assertStartsWith: Expected toString is empty! Actual: {rendered}\t{}",
                render::type_name_of::<T>()
            )));
        }
        if !rendered.starts_with(&render::line(&prefix)) {
            return Err(self.fail(format!(
                "assertStartsWith: expected:<{}>, but was:<{rendered}> ({})",
                render::line(&prefix),
                render::type_name_of::<T>()
            )));
        }
        Ok(actual)
    }

    /// Fails if `matcher` rejects `actual`.
    pub fn assert_that<T, M>(&self, actual: &T, matcher: &M) -> Result<(), Failure>
    where
        T: ?Sized,
        M: Matcher<T> + ?Sized,
    {
        matcher.check(actual).map_err(|text| self.fail(text))
    }

    /// Runs `action` and returns the error it raised, which must be of type
    /// `E`.
    ///
    /// Fails if the action succeeds or raises a different type. Panics are
    /// caught and matched as [`PanicError`]. The match is on the concrete
    /// type that was raised: an action that returns a [`Failure`] is matched
    /// against `Failure`.
    ///
    /// ```
    /// use crossunit::Waiter;
    /// use std::num::ParseIntError;
    ///
    /// let waiter = Waiter::new();
    /// let err = waiter
    ///     .assert_throws::<ParseIntError, _, _>(|| "x".parse::<u8>())
    ///     .unwrap();
    /// assert_eq!(err.to_string(), "invalid digit found in string");
    /// ```
    pub fn assert_throws<E, T, X>(&self, action: impl FnOnce() -> Result<T, X>) -> Result<E, Failure>
    where
        E: StdError + 'static,
        X: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        let origin = render::short_type_name(std::any::type_name_of_val(&action));
        let expected = render::type_name_of::<E>();

        let (thrown, mut actual): (Box<dyn StdError + Send + Sync>, String) =
            match panic::catch_unwind(AssertUnwindSafe(action)) {
                Ok(Ok(_)) => {
                    return Err(self.fail_cause(
                        Error::assertion(format!(
                            "[assertThrows] No exception was thrown! Expected: {expected}\n\n@ {origin}"
                        ))
                        .with_thread(ThreadTag::current())
                        .with_origin(origin),
                    ));
                }
                Ok(Err(thrown)) => (thrown.into(), render::type_name_of::<X>()),
                Err(payload) => (
                    Box::new(PanicError::from_payload(ThreadTag::current(), &*payload))
                        as Box<dyn StdError + Send + Sync>,
                    render::type_name_of::<PanicError>(),
                ),
            };

        let thrown = match thrown.downcast::<E>() {
            Ok(matched) => return Ok(*matched),
            Err(other) => other,
        };

        let actual_id = if actual == render::type_name_of::<PanicError>() {
            TypeId::of::<PanicError>()
        } else {
            TypeId::of::<X>()
        };
        let mut expected = expected;
        if expected == actual {
            expected = format!("{expected}@{:?}", TypeId::of::<E>());
            actual = format!("{actual}@{actual_id:?}");
        }
        let cause: Cause = Arc::from(thrown);
        let message = format!(
            "[assertThrows] Bad thrown exception type! Expected: {expected}\n\t^^^ but → {}\t# of({actual})\n\n@ {origin}",
            render::chain(&*cause),
        );
        Err(self.fail_cause(
            Error::assertion(message)
                .with_cause(cause)
                .with_thread(ThreadTag::current())
                .with_origin(origin),
        ))
    }
}
