use std::hint::black_box;

use coalesced_ranges::RangeSet;
use criterion::{Criterion, criterion_group, criterion_main};
use rand::prelude::*;
use range_set_blaze::RangeSetBlaze;

const SET_SIZE: i64 = 1000;
const RANGE_MAX: i64 = 10_000;

/// Random intervals from a fixed seed so every run sees the same data.
fn generate_random_ranges(count: i64) -> Vec<(i64, i64)> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut ranges = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let a = rng.random_range(0..RANGE_MAX);
        let b = rng.random_range(0..RANGE_MAX);
        ranges.push((a.min(b), a.max(b)));
    }
    ranges
}

fn insertion_benchmark(c: &mut Criterion) {
    let random_ranges = generate_random_ranges(SET_SIZE);

    let sequential_ranges: Vec<_> = (0..SET_SIZE).map(|i| (i * 10, i * 10 + 5)).collect();

    let mut reverse_ranges = sequential_ranges.clone();
    reverse_ranges.reverse();

    let mut group = c.benchmark_group("Insertion Performance");

    for (name, ranges) in [
        ("Sequential", &sequential_ranges),
        ("Reverse", &reverse_ranges),
        ("Random", &random_ranges),
    ] {
        group.bench_function(format!("RangeSet - {name}"), |b| {
            b.iter(|| {
                let mut set = RangeSet::new();
                for &(start, end) in black_box(ranges) {
                    set.add_range(start, end).unwrap();
                }
                set
            })
        });

        // one sort at the end instead of a merge per insert
        group.bench_function(format!("RangeSet deferred - {name}"), |b| {
            b.iter(|| {
                let mut set = RangeSet::new();
                for &(start, end) in black_box(ranges) {
                    set.add_range_deferred(start, end).unwrap();
                }
                set.normalize();
                set
            })
        });

        group.bench_function(format!("RangeSetBlaze - {name}"), |b| {
            b.iter(|| {
                let mut set = RangeSetBlaze::new();
                for &(start, end) in black_box(ranges) {
                    set.ranges_insert(start..=end);
                }
                set
            })
        });
    }

    group.finish();
}

criterion_group!(benches, insertion_benchmark);
criterion_main!(benches);
