//! Throughput Benchmark for cachekv
//!
//! Measures the cache store, the command path and snapshot writing under a
//! few representative workloads.

use bytes::Bytes;
use cachekv::backing::{MemoryBackingStore, NullBackingStore};
use cachekv::commands::{CommandHandler, DEFAULT_BACKFILL_TTL};
use cachekv::protocol::parse_command;
use cachekv::storage::{persist_to_file, CacheStore};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

fn store(capacity: usize) -> Arc<CacheStore> {
    Arc::new(CacheStore::with_capacity(capacity).unwrap())
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    // Fits: no evictions
    let roomy = store(1_000_000);
    group.bench_function("set_no_eviction", |b| {
        let mut i = 0u64;
        b.iter(|| {
            roomy.set(
                format!("key:{}", i % 100_000),
                Bytes::from("small_value"),
                Duration::ZERO,
            );
            i += 1;
        });
    });

    // Full: every fresh key evicts the LRU tail
    let full = store(1_000);
    group.bench_function("set_with_eviction", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(full.set(
                format!("key:{}", i),
                Bytes::from("small_value"),
                Duration::ZERO,
            ));
            i += 1;
        });
    });

    let ttl = store(100_000);
    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            ttl.set(
                format!("key:{}", i % 100_000),
                Bytes::from("value"),
                Duration::from_secs(3600),
            );
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = store(100_000);

    // Pre-populate with data
    for i in 0..100_000 {
        engine.set(
            format!("key:{}", i),
            Bytes::from(format!("value:{}", i)),
            Duration::ZERO,
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(engine.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark the full command path (parse, execute, serialize)
fn bench_commands(c: &mut Criterion) {
    let mut group = c.benchmark_group("commands");
    group.throughput(Throughput::Elements(1));

    group.bench_function("parse_set", |b| {
        b.iter(|| black_box(parse_command(black_box(b"set session:42 abcdef 3600"))));
    });

    let handler = CommandHandler::new(
        store(10_000),
        Arc::new(NullBackingStore),
        DEFAULT_BACKFILL_TTL,
    );
    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let line = if i % 5 == 0 {
                format!("set key:{} value", i % 10_000)
            } else {
                format!("get key:{}", i % 10_000)
            };
            black_box(handler.execute(line.as_bytes()).serialize());
            i += 1;
        });
    });

    // Every get misses the cache and is served by the backing store.
    let backing = Arc::new(MemoryBackingStore::with_rows(
        (0..10_000).map(|i| (format!("row:{}", i), Bytes::from("backed"))),
    ));
    let tiny = store(16);
    let read_through = CommandHandler::new(Arc::clone(&tiny), backing, DEFAULT_BACKFILL_TTL);
    group.bench_function("read_through", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(read_through.execute(format!("get row:{}", i % 10_000).as_bytes()));
            i += 1;
        });
    });
    tiny.shutdown_writes();

    group.finish();
}

/// Benchmark concurrent access through the single store lock
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = store(20_000);
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            engine.set(key.clone(), Bytes::from("value"), Duration::ZERO);
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark background maintenance
fn bench_maintenance(c: &mut Criterion) {
    let mut group = c.benchmark_group("maintenance");

    let engine = store(10_000);
    for i in 0..10_000 {
        engine.set(
            format!("key:{}", i),
            Bytes::from("x".repeat(64)),
            Duration::from_secs(3600),
        );
    }

    group.bench_function("sweep_nothing_expired", |b| {
        b.iter(|| black_box(engine.sweep_expired()));
    });

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.txt");
    group.bench_function("snapshot_10k", |b| {
        b.iter(|| black_box(persist_to_file(&engine, &path).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_commands,
    bench_concurrent,
    bench_maintenance,
);

criterion_main!(benches);
