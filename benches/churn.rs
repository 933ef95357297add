//! Allocator benchmarks: steady-state churn and best-fit scans over a
//! fragmented pool.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dynalloc::DynamicAllocator;

fn bench_allocate_free_churn(c: &mut Criterion) {
    let mut allocator = DynamicAllocator::new(1024 * 1024);

    c.bench_function("allocate_free_churn", |b| {
        b.iter(|| {
            let address = allocator.allocate(black_box(4096)).unwrap();
            black_box(address);
            allocator.free(address);
        })
    });
}

fn bench_best_fit_over_fragmented_pool(c: &mut Criterion) {
    let mut allocator = DynamicAllocator::new(8 * 1024 * 1024);

    // Fragment the pool: allocate a run of blocks, then free every other
    // one so the free list keeps differently sized holes pinned between
    // live neighbours.
    let mut held = Vec::new();
    let mut releasable = Vec::new();
    for i in 0..256usize {
        let address = allocator.allocate(1024 + i * 16).unwrap();
        if i % 2 == 0 {
            held.push(address);
        } else {
            releasable.push(address);
        }
    }
    for address in releasable {
        allocator.free(address);
    }

    c.bench_function("best_fit_fragmented", |b| {
        b.iter(|| {
            let address = allocator.allocate(black_box(2048)).unwrap();
            black_box(address);
            allocator.free(address);
        })
    });

    for address in held {
        allocator.free(address);
    }
}

criterion_group!(
    benches,
    bench_allocate_free_churn,
    bench_best_fit_over_fragmented_pool
);
criterion_main!(benches);
