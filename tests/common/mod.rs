#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! #[macro_use]
//! mod common;
//! use common::*;
//! ```

use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::sync::Once;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Seed applied under CI when `CROSSUNIT_PROPTEST_SEED` is not set.
const CI_PROPTEST_SEED: u64 = 0x5EED_5EED;

/// Builds a proptest configuration for `cases` cases.
///
/// The seed comes from `CROSSUNIT_PROPTEST_SEED`, falling back to a fixed
/// seed when `CI` is set; an explicit `PROPTEST_RNG_SEED` still wins.
/// `CROSSUNIT_PROPTEST_MAX_SHRINK_ITERS` bounds shrinking.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    if let Some(iters) = env_parse::<u32>("CROSSUNIT_PROPTEST_MAX_SHRINK_ITERS") {
        config.max_shrink_iters = iters;
    }
    config
}

fn proptest_seed() -> Option<u64> {
    env_parse("CROSSUNIT_PROPTEST_SEED")
        .or_else(|| std::env::var_os("CI").map(|_| CI_PROPTEST_SEED))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

/// Initializes trace-level test logging once per test binary.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Spawns a named worker thread that sleeps for `delay` before running `f`.
pub fn spawn_after<F, T>(name: &str, delay: Duration, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            std::thread::sleep(delay);
            f()
        })
        .expect("failed to spawn test worker")
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
