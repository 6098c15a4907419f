//! Criterion micro-benchmarks for entity/component manager operations.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use tandem_bench::populated_ecm;
use tandem_ecm::{EntityComponentManager, EntityQuery, Name};
use tandem_test_utils::{Counter, JointVelocity};

/// Benchmark: create 10K entities with one component each.
fn bench_create_10k(c: &mut Criterion) {
    c.bench_function("ecm_create_10k", |b| {
        b.iter(|| {
            let mut ecm = EntityComponentManager::new();
            for i in 0..10_000u64 {
                let e = ecm.create_entity().unwrap();
                ecm.create_component(e, Counter(i)).unwrap();
            }
            black_box(ecm.entity_count());
        });
    });
}

/// Benchmark: two-component iteration over 10K entities (5K matches).
fn bench_each_pair_10k(c: &mut Criterion) {
    let ecm = populated_ecm(10_000);
    c.bench_function("ecm_each_pair_10k", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            ecm.each::<(Counter, JointVelocity)>(|_, (count, vel)| {
                sum += count.0 as f64 + vel.0;
                true
            });
            black_box(sum);
        });
    });
}

/// Benchmark: mutate every counter, then clear change flags.
fn bench_each_mut_10k(c: &mut Criterion) {
    let mut ecm = populated_ecm(10_000);
    c.bench_function("ecm_each_mut_10k", |b| {
        b.iter(|| {
            ecm.each_mut::<Counter>(|_, count| {
                count.0 += 1;
                true
            });
            ecm.set_all_components_unchanged();
        });
    });
}

/// Benchmark: changed-component delta of 1K entities out of 10K.
fn bench_state_delta(c: &mut Criterion) {
    let mut ecm = populated_ecm(10_000);
    let entities: Vec<_> = ecm.entities().take(1_000).collect();
    c.bench_function("ecm_state_delta_1k", |b| {
        b.iter(|| {
            for &e in &entities {
                ecm.set_component_data(e, Counter(7));
            }
            let delta = ecm.state(entities.iter().copied(), false);
            black_box(delta.len());
            ecm.set_all_components_unchanged();
        });
    });
}

/// Benchmark: name lookup and view refresh.
fn bench_lookup_and_views(c: &mut Criterion) {
    let mut ecm = populated_ecm(10_000);
    ecm.add_query(EntityQuery::of::<(Name,)>());
    c.bench_function("ecm_entity_by_name", |b| {
        b.iter(|| black_box(ecm.entity_by_name("entity_9990")));
    });
    c.bench_function("ecm_advance_views", |b| {
        b.iter(|| ecm.advance_views());
    });
}

criterion_group!(
    benches,
    bench_create_10k,
    bench_each_pair_10k,
    bench_each_mut_10k,
    bench_state_delta,
    bench_lookup_and_views
);
criterion_main!(benches);
