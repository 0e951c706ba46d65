//! Transaction guard benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use obsv_core::TransactionGuard;

/// Benchmark opening and closing a session.
fn bench_session_cycle(c: &mut Criterion) {
    let guard = TransactionGuard::new();
    c.bench_function("session_cycle", |b| {
        b.iter(|| {
            let txn = guard.start_transaction(None);
            black_box(txn.session().id());
        });
    });
}

/// Benchmark reentrant acquisition at increasing depth.
fn bench_nested_transactions(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_transactions");

    for depth in [1usize, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let guard = TransactionGuard::new();
            b.iter(|| {
                let held: Vec<_> = (0..depth).map(|_| guard.start_transaction(None)).collect();
                black_box(guard.hold_count());
                // Release innermost first.
                for txn in held.into_iter().rev() {
                    drop(txn);
                }
            });
        });
    }
    group.finish();
}

/// Benchmark uncontended read locks.
fn bench_read_lock(c: &mut Criterion) {
    let guard = TransactionGuard::new();
    c.bench_function("read_lock", |b| {
        b.iter(|| {
            let read = guard.lock_read();
            black_box(&read);
        });
    });
}

/// Benchmark session observers firing on every cycle.
fn bench_observed_session(c: &mut Criterion) {
    let guard = TransactionGuard::new();
    let _sub = guard.subscribe_sessions(|event| {
        black_box(event.new.is_some());
    });
    c.bench_function("observed_session_cycle", |b| {
        b.iter(|| drop(guard.start_transaction(None)));
    });
}

criterion_group!(
    benches,
    bench_session_cycle,
    bench_nested_transactions,
    bench_read_lock,
    bench_observed_session,
);

criterion_main!(benches);
