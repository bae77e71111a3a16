//! Fetch Queue Benchmarks
//!
//! Performance benchmarks for request queueing and dispatch

use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use terratile_core::{FetchQueue, FetchRequest, TaskService, TileKey};

/// Accepts a fixed number of requests and forgets them
struct CountingService {
    limit: usize,
    submitted: AtomicUsize,
}

impl TaskService for CountingService {
    fn has_capacity(&self) -> bool {
        self.submitted.load(Ordering::Relaxed) < self.limit
    }

    fn submit(&self, _request: FetchRequest) -> bool {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        true
    }
}

/// Requests spread over levels 1-18 in a scrambled order
fn requests(count: usize) -> Vec<FetchRequest> {
    (0..count)
        .map(|i| {
            let level = (i * 7 % 18) as u32 + 1;
            FetchRequest::for_tile(TileKey::new(level, i as i64, (i * 3) as i64))
        })
        .collect()
}

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_queue_push");

    for count in [100, 1000, 10000].iter() {
        let requests = requests(*count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &requests, |b, requests| {
            b.iter(|| {
                let mut queue = FetchQueue::with_capacity(200);
                for request in requests {
                    queue.try_push(*request);
                }
                black_box(queue.len())
            });
        });
    }

    group.finish();
}

fn bench_duplicates(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_queue_duplicates");

    group.bench_function("same_key_1000", |b| {
        let request = FetchRequest::for_tile(TileKey::new(12, 1024, 2048));

        b.iter(|| {
            let mut queue = FetchQueue::with_capacity(200);
            for _ in 0..1000 {
                queue.try_push(black_box(request));
            }
            black_box(queue.len())
        });
    });

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_queue_dispatch");

    for limit in [16, 200].iter() {
        let requests = requests(200);
        group.bench_with_input(BenchmarkId::from_parameter(limit), limit, |b, &limit| {
            b.iter(|| {
                let mut queue = FetchQueue::with_capacity(200);
                for request in &requests {
                    queue.try_push(*request);
                }
                let service = CountingService {
                    limit,
                    submitted: AtomicUsize::new(0),
                };
                black_box(queue.dispatch(&service))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_push, bench_duplicates, bench_dispatch);
criterion_main!(benches);
