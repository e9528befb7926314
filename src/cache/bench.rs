use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;

// Reference the main crate
extern crate kernmem;

use kernmem::cache::BlockCache;
use kernmem::clock::RecencyClock;
use kernmem::disk::MemDisk;
use kernmem::types::CacheConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Test configuration
const THREADS: usize = 4;
const OPERATIONS_PER_THREAD: usize = 2_000;

fn make_cache(blocks: usize, buckets: usize) -> Arc<BlockCache> {
    let device = Arc::new(MemDisk::new());
    let clock = Arc::new(RecencyClock::new());
    Arc::new(BlockCache::new(
        CacheConfig { blocks, buckets },
        device,
        clock,
    ))
}

// Benchmark the hit path: one resident block read over and over
pub fn bench_hit_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("HitPath");

    group.bench_function("single_thread", |b| {
        let cache = make_cache(30, 13);
        b.iter(|| {
            let guard = cache.read(1, 7).unwrap();
            black_box(guard[0]);
        })
    });

    group.bench_function("four_threads_distinct_buckets", |b| {
        b.iter(|| {
            let cache = make_cache(30, 13);
            let handles: Vec<_> = (0..THREADS)
                .map(|t| {
                    let cache = cache.clone();
                    thread::spawn(move || {
                        for _ in 0..OPERATIONS_PER_THREAD {
                            let guard = cache.read(1, t as u32).unwrap();
                            black_box(guard[0]);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });

    group.finish();
}

// Benchmark the miss path: a working set larger than the pool keeps the
// victim search busy
pub fn bench_evict_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("EvictPath");

    group.bench_function("random_over_capacity", |b| {
        let cache = make_cache(16, 4);
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| {
            let blockno = rng.gen_range(0..64u32);
            let guard = cache.read(1, blockno).unwrap();
            black_box(guard[0]);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_hit_path, bench_evict_path);
criterion_main!(benches);
