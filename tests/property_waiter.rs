//! Property tests for the await/resume protocol.
//!
//! # Properties Tested
//!
//! - N resumes after arming for N release the wait (N = 0 included)
//! - M < N resumes time out with `expected = N, actual = M`, verify mode or not
//! - Over-resuming never fails a later wait of the same or smaller size
//! - A cause failed any number of times, directly or through wrappers, is
//!   queued exactly once
//! - Failures always unblock a pending wait, whatever the budget

#[macro_use]
mod common;

use common::*;
use crossunit::{Cause, Error, ErrorKind, IntoCause, Waiter};
use proptest::prelude::*;
use std::io;
use std::sync::Arc;
use std::time::Duration;

fn resume_from_threads(waiter: &Waiter, count: u32) {
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let worker = waiter.clone();
            std::thread::spawn(move || worker.resume())
        })
        .collect();
    for handle in handles {
        handle.join().expect("resumer panicked");
    }
}

proptest! {
    #![proptest_config(test_proptest_config(32))]

    /// Exactly N resumes release a wait armed for N.
    #[test]
    fn exact_resumes_release(n in 0u32..16) {
        init_test_logging();
        let waiter = Waiter::named("exact", true, true);
        resume_from_threads(&waiter, n);
        prop_assert!(waiter.wait_resumes(Duration::from_secs(5), n).is_ok());
        prop_assert_eq!(waiter.remaining_resumes(), 0);
    }

    /// Fewer resumes than expected time out with the right tally, whether or
    /// not verify mode also flags the budget.
    #[test]
    fn short_resumes_time_out(n in 1u32..8, missing in 1u32..8, verify in any::<bool>()) {
        init_test_logging();
        let m = n.saturating_sub(missing);
        let waiter = Waiter::named("short", true, verify);
        resume_from_threads(&waiter, m);

        let failure = waiter
            .wait_resumes(Duration::from_millis(20), n)
            .expect_err("budget unmet");
        prop_assert!(failure.is_timeout());
        let tally = failure.error().and_then(Error::tally).copied().expect("tally");
        prop_assert_eq!(tally.expected, i64::from(n));
        prop_assert_eq!(tally.actual, i64::from(m));
        let report = failure
            .error()
            .and_then(Error::cause)
            .and_then(|cause| cause.downcast_ref::<Error>())
            .map(Error::kind);
        prop_assert_eq!(report, verify.then_some(ErrorKind::Unverified));
    }

    /// Surplus resumes are tolerated.
    #[test]
    fn over_resume_is_idempotent(n in 0u32..8, extra in 1u32..8, next in 0u32..8) {
        init_test_logging();
        let waiter = Waiter::new();
        resume_from_threads(&waiter, n + extra);
        prop_assert!(waiter.wait_resumes(Duration::from_secs(5), n).is_ok());

        let smaller = next.min(n);
        resume_from_threads(&waiter, smaller);
        prop_assert!(waiter.wait_resumes(Duration::from_secs(5), smaller).is_ok());
    }

    /// The same cause is recorded once, however it is re-offered.
    #[test]
    fn duplicate_causes_recorded_once(repeats in 1usize..6, wrappers in 0usize..4) {
        init_test_logging();
        let waiter = Waiter::named("dedup", false, false);
        let cause: Cause = Arc::new(io::Error::other("shared"));

        for _ in 0..repeats {
            let _ = waiter.fail_cause(Arc::clone(&cause));
            let _ = waiter.rethrow(Arc::clone(&cause));
        }
        for i in 0..wrappers {
            let wrapper = Error::assertion(format!("wrapper {i}"))
                .with_cause(Arc::clone(&cause))
                .into_cause();
            let _ = waiter.fail_with("via wrapper", wrapper);
        }

        prop_assert_eq!(waiter.failure_count(), 1);
        prop_assert_eq!(waiter.remaining_resumes(), -1);
    }

    /// A failure releases a wait armed for any number of resumes.
    #[test]
    fn failure_unblocks_pending_wait(expected in 1u32..64) {
        init_test_logging();
        let waiter = Waiter::new();
        let worker = waiter.clone();
        let handle = spawn_after("failer", Duration::from_millis(2), move || {
            let _ = worker.fail("worker failed");
        });
        let failure = waiter
            .wait_resumes(Duration::ZERO, expected)
            .expect_err("failure delivered");
        handle.join().expect("worker panicked");
        prop_assert!(!failure.is_timeout());
        prop_assert_eq!(waiter.failure_count(), 0);
    }
}
