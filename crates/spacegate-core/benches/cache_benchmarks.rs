//! Benchmarks for the gateway caches

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use spacegate_core::cache::StatCache;
use spacegate_core::{CacheConfig, CacheStore};
use spacegate_services::{Reference, ResourceId, ResourceInfo, Status, StatResponse};

fn stat_cache(capacity: usize) -> StatCache {
    StatCache::new(&CacheConfig {
        store: CacheStore::Memory,
        ttl_secs: 300,
        capacity,
    })
}

fn response(id: &ResourceId) -> StatResponse {
    StatResponse {
        status: Status::ok(),
        info: Some(ResourceInfo {
            id: id.clone(),
            name: format!("file-{}", id.opaque_id),
            ..Default::default()
        }),
    }
}

fn fill(cache: &StatCache, users: usize, files: usize) {
    for u in 0..users {
        for f in 0..files {
            let id = ResourceId::new("storage-users", format!("space-{u}"), format!("node-{f}"));
            let key = StatCache::key(&format!("user-{u}"), &Reference::from_id(id.clone()), &[])
                .unwrap();
            cache.push(key, &response(&id));
        }
    }
}

fn bench_stat_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("stat_cache_pull");

    for size in [100, 1_000, 10_000].iter() {
        let cache = stat_cache(*size);
        fill(&cache, 10, size / 10);
        let id = ResourceId::new("storage-users", "space-3", "node-7");
        let key = StatCache::key("user-3", &Reference::from_id(id), &[]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(cache.pull(&key)))
        });
    }

    group.finish();
}

fn bench_stat_push(c: &mut Criterion) {
    let cache = stat_cache(10_000);
    let id = ResourceId::new("storage-users", "space-0", "node-0");
    let res = response(&id);
    let mut n = 0u64;

    c.bench_function("stat_cache_push", |b| {
        b.iter(|| {
            n += 1;
            let key = format!("uid:einstein!sid:storage-users$space-0!oid:node-{n}!path:");
            cache.push(black_box(key), &res);
        })
    });
}

fn bench_invalidate_space(c: &mut Criterion) {
    let mut group = c.benchmark_group("stat_cache_invalidate");

    for files in [10, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(files), files, |b, &files| {
            b.iter_batched(
                || {
                    let cache = stat_cache(20_000);
                    fill(&cache, 10, files);
                    cache
                },
                |cache| {
                    let id = ResourceId::new("storage-users", "space-5", "node-1");
                    black_box(cache.invalidate("user-5", &id))
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_stat_lookup, bench_stat_push, bench_invalidate_space);
criterion_main!(benches);
