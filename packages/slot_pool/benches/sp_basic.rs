//! Basic benchmarks for the `slot_pool` crate.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::iter;
use std::time::Instant;

use alloc_tracker::Allocator;
use criterion::{Criterion, criterion_group, criterion_main};
use slot_pool::{SlotAllocator, SlotRegistry};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

#[global_allocator]
static ALLOCATOR: Allocator<std::alloc::System> = Allocator::system();

type TestItem = usize;
const TEST_VALUE: TestItem = 1024;
const CAPACITY: usize = 1024;

fn initialized() -> SlotAllocator<TestItem, CAPACITY> {
    let mut allocator = SlotAllocator::new();
    allocator.initialize().unwrap();
    allocator
}

fn entrypoint(c: &mut Criterion) {
    let allocs = alloc_tracker::Session::new();

    let mut group = c.benchmark_group("slot_basic");

    let mut allocs_op = allocs.operation("initialize");
    group.bench_function("initialize", |b| {
        b.iter_custom(|iters| {
            let mut allocators = iter::repeat_with(SlotAllocator::<TestItem, CAPACITY>::new)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for allocator in &mut allocators {
                _ = black_box(allocator.initialize());
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("insert_first");
    group.bench_function("insert_first", |b| {
        b.iter_custom(|iters| {
            let mut allocators = iter::repeat_with(initialized)
                .take(usize::try_from(iters).unwrap())
                .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for allocator in &mut allocators {
                _ = black_box(allocator.insert(black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("insert_after_half_full");
    group.bench_function("insert_after_half_full", |b| {
        b.iter_custom(|iters| {
            let mut allocators = iter::repeat_with(|| {
                let mut allocator = initialized();
                for _ in 0..CAPACITY / 2 {
                    allocator.insert(TEST_VALUE).unwrap();
                }
                allocator
            })
            .take(usize::try_from(iters).unwrap())
            .collect::<Vec<_>>();

            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for allocator in &mut allocators {
                _ = black_box(allocator.insert(black_box(TEST_VALUE)));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("insert_deallocate");
    group.bench_function("insert_deallocate", |b| {
        let mut allocator = initialized();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let handle = allocator.insert(black_box(TEST_VALUE)).unwrap();
                _ = black_box(allocator.deallocate(handle));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("bucket_16");
    group.bench_function("bucket_16", |b| {
        let mut allocator = initialized();

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let bucket = allocator.allocate_bucket::<16>().unwrap();
                _ = black_box(allocator.deallocate_bucket(&bucket));
            }

            start.elapsed()
        });
    });

    let mut allocs_op = allocs.operation("registry_fetch_release");
    group.bench_function("registry_fetch_release", |b| {
        let mut registry = SlotRegistry::<CAPACITY>::new();

        // Leave only the last word partially free so the scan has to skip full words.
        let reserved = registry.fetch(CAPACITY - 8).unwrap();
        _ = black_box(reserved);

        b.iter_custom(|iters| {
            let _span = allocs_op.measure_thread().iterations(iters);

            let start = Instant::now();

            for _ in 0..iters {
                let indices = registry.fetch_array::<1>().unwrap();
                for &index in &indices {
                    registry.release(black_box(index));
                }
            }

            start.elapsed()
        });
    });

    group.finish();

    allocs.print_to_stdout();
}
