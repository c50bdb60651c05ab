//! Waiter protocol benchmarks.
//!
//! Benchmarks the hot paths of the await/resume protocol:
//! - Pre-resumed wait cycles (arm, release, drain, re-arm)
//! - Cross-thread resume handoff
//! - Failure recording against a sink that already holds many causes
//!
//! Performance targets:
//! - Pre-resumed cycle: < 1µs
//! - Duplicate check: linear in queued causes, < 50ns per queued record

#![allow(missing_docs)]
#![allow(clippy::semicolon_if_nothing_returned)]

use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};

use crossunit::{Cause, Waiter};
use std::io;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// WAIT CYCLES
// =============================================================================

fn bench_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("wait_cycle");

    for &resumes in &[1u32, 16, 256] {
        group.throughput(Throughput::Elements(u64::from(resumes)));
        group.bench_with_input(
            BenchmarkId::new("pre_resumed", resumes),
            &resumes,
            |b, &n| {
                let waiter = Waiter::new();
                b.iter(|| {
                    for _ in 0..n {
                        waiter.resume();
                    }
                    black_box(waiter.wait_resumes(Duration::from_secs(1), n))
                })
            },
        );
    }

    group.bench_function("cross_thread_handoff", |b| {
        let waiter = Waiter::new();
        b.iter(|| {
            let worker = waiter.clone();
            let handle = std::thread::spawn(move || worker.resume());
            let result = waiter.wait_timeout(Duration::from_secs(5));
            handle.join().expect("resumer panicked");
            black_box(result)
        })
    });

    group.finish();
}

// =============================================================================
// FAILURE RECORDING
// =============================================================================

fn bench_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("failure_dedup");

    for &queued in &[1usize, 64, 1024] {
        group.bench_with_input(
            BenchmarkId::new("duplicate_offer", queued),
            &queued,
            |b, &n| {
                b.iter_batched(
                    || {
                        let waiter = Waiter::named("bench", false, false);
                        let causes: Vec<Cause> = (0..n)
                            .map(|i| Arc::new(io::Error::other(format!("cause {i}"))) as Cause)
                            .collect();
                        for cause in &causes {
                            let _ = waiter.fail_cause(Arc::clone(cause));
                        }
                        (waiter, causes)
                    },
                    |(waiter, causes)| {
                        let last = causes.last().map(Arc::clone);
                        if let Some(last) = last {
                            black_box(waiter.rethrow(last));
                        }
                        black_box(waiter.failure_count())
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_cycle, bench_dedup);
criterion_main!(benches);
