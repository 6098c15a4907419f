//! Criterion benchmarks for full simulation steps and the worker pool.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tandem_bench::robot_runner;
use tandem_engine::WorkerPool;

/// Benchmark: one step of 10 robots with 4 controlled joints each.
fn bench_step_small(c: &mut Criterion) {
    let mut runner = robot_runner(10, 4);
    c.bench_function("runner_step_10x4", |b| {
        b.iter(|| black_box(runner.step()));
    });
}

/// Benchmark: one step of 200 robots with 6 controlled joints each.
fn bench_step_large(c: &mut Criterion) {
    let mut runner = robot_runner(200, 6);
    c.bench_function("runner_step_200x6", |b| {
        b.iter(|| black_box(runner.step()));
    });
}

/// Benchmark: paused step (dt = 0) to isolate scheduling overhead.
fn bench_step_paused(c: &mut Criterion) {
    let mut runner = robot_runner(10, 4);
    runner.control().set_paused(true);
    c.bench_function("runner_step_paused_10x4", |b| {
        b.iter(|| black_box(runner.step()));
    });
}

/// Benchmark: fan 8 small jobs out over a 4-thread pool and collect them.
fn bench_pool_map(c: &mut Criterion) {
    let pool = WorkerPool::new(4).unwrap();
    c.bench_function("pool_map_8", |b| {
        b.iter(|| {
            let out = pool
                .map((0..8u64).collect::<Vec<_>>(), |i| (0..1_000u64).map(|x| x ^ i).sum::<u64>())
                .unwrap();
            black_box(out);
        });
    });
}

criterion_group!(
    benches,
    bench_step_small,
    bench_step_large,
    bench_step_paused,
    bench_pool_map
);
criterion_main!(benches);
