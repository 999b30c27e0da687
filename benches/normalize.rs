use std::hint::black_box;

use coalesced_ranges::RangeSet;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rand::prelude::*;

fn deferred_set(ranges: &[(i64, i64)]) -> RangeSet {
    let mut set = RangeSet::new();
    for &(start, end) in ranges {
        set.add_range_deferred(start, end).unwrap();
    }
    set
}

fn normalize_benchmark(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let overlapping: Vec<_> = (0..10_000)
        .map(|_| {
            let start = rng.random_range(0..100_000i64);
            (start, start + rng.random_range(0..50))
        })
        .collect();
    // every interval touches the next one, so it all folds into one
    let chain: Vec<_> = (0..10_000i64).rev().map(|i| (i * 2, i * 2 + 1)).collect();

    let mut group = c.benchmark_group("Normalize");
    for (name, ranges) in [("overlapping", &overlapping), ("adjacent_chain", &chain)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || deferred_set(ranges),
                |mut set| {
                    set.normalize();
                    black_box(set)
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, normalize_benchmark);
criterion_main!(benches);
