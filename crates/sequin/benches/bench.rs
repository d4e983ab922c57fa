use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sequin::{ParallelConfig, iter, prelude::*};

// Elements per benchmark iteration.
const TOTAL_ELEMS: u64 = 4096;

/// A small CPU-bound task, so the engine overhead stays visible.
fn work(x: u64) -> u64 {
    let mut h = x ^ 0xcbf2_9ce4_8422_2325;
    for _ in 0..64 {
        h = h.wrapping_mul(0x0100_0000_01b3).rotate_left(7);
    }
    h
}

fn bench_par_map(c: &mut Criterion, group_name: &str, config: impl Fn(usize) -> ParallelConfig) {
    let mut group = c.benchmark_group(group_name);

    for concurrency in [1, 2, 4, 8] {
        group.throughput(Throughput::Elements(TOTAL_ELEMS));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_ELEMS, concurrency),
            |b| {
                b.iter(|| {
                    let sum = iter(0..TOTAL_ELEMS)
                        .par_map(config(concurrency), work)
                        .fold(0_u64, u64::wrapping_add);
                    black_box(sum);
                });
            },
        );
    }

    group.finish();
}

fn benchmark_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential/map");
    group.throughput(Throughput::Elements(TOTAL_ELEMS));
    group.bench_function(format!("elems/{}", TOTAL_ELEMS), |b| {
        b.iter(|| {
            let sum = iter(0..TOTAL_ELEMS).map(work).fold(0_u64, u64::wrapping_add);
            black_box(sum);
        });
    });
    group.finish();
}

fn benchmark_unordered(c: &mut Criterion) {
    bench_par_map(c, "parallel/unordered", |n| ParallelConfig::from(n).unordered());
}

fn benchmark_ordered(c: &mut Criterion) {
    bench_par_map(c, "parallel/ordered", ParallelConfig::from);
}

fn benchmark_chunked(c: &mut Criterion) {
    bench_par_map(c, "parallel/chunked/64", |n| {
        ParallelConfig::from(n).with_chunk_size(64)
    });
}

fn benchmark_reduce(c: &mut Criterion) {
    let mut group = c.benchmark_group("parallel/reduce");
    group.throughput(Throughput::Elements(TOTAL_ELEMS));
    group.bench_function(format!("elems/{}", TOTAL_ELEMS), |b| {
        b.iter(|| {
            let sum = iter(0..TOTAL_ELEMS)
                .map(work)
                .par_reduce(4, || 0, u64::wrapping_add);
            black_box(sum);
        });
    });
    group.finish();
}

fn benchmark_prefetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("prefetch");
    for depth in [1, 16, 256] {
        group.throughput(Throughput::Elements(TOTAL_ELEMS));
        group.bench_function(format!("elems/{}/depth/{}", TOTAL_ELEMS, depth), |b| {
            b.iter(|| {
                let sum = iter(0..TOTAL_ELEMS)
                    .map(work)
                    .prefetch(depth)
                    .fold(0_u64, |acc, x| acc.wrapping_add(work(x)));
                black_box(sum);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_sequential,
    benchmark_unordered,
    benchmark_ordered,
    benchmark_chunked,
    benchmark_reduce,
    benchmark_prefetch,
);
criterion_main!(benches);
