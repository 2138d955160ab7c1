//! Store engine benchmarks.
//!
//! Measures the costs that dominate the family workload: durable commits of
//! small batches, snapshot point reads, bucket scans, and journal compaction.

#![allow(clippy::expect_used, missing_docs)]

use std::{hint::black_box, time::Duration};

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use kinship_store::{Database, FileBackend, InMemoryBackend, ReadAccess};
use kinship_types::config::StoreConfig;
use tempfile::TempDir;

// =============================================================================
// Helpers
// =============================================================================

const BUCKET: &str = "people";

fn key(i: u64) -> [u8; 8] {
    i.to_be_bytes()
}

/// Fill `BUCKET` with `count` entries, committing every `batch_size`.
fn populate<B: kinship_store::StorageBackend>(db: &Database<B>, count: u64, batch_size: u64) {
    let mut txn = db.write().expect("write txn");
    txn.create_bucket(BUCKET).expect("create bucket");
    txn.commit().expect("commit");

    for batch_start in (0..count).step_by(batch_size as usize) {
        let mut txn = db.write().expect("write txn");
        for i in batch_start..(batch_start + batch_size).min(count) {
            txn.insert(BUCKET, &key(i), format!("person-{i}").as_bytes()).expect("insert");
        }
        txn.commit().expect("commit");
    }
}

fn open_file(dir: &TempDir, sync_on_commit: bool) -> Database<FileBackend> {
    let config = StoreConfig::builder().sync_on_commit(sync_on_commit).build().expect("config");
    Database::open_with_config(dir.path().join("bench.db"), config).expect("open")
}

// =============================================================================
// Commits
// =============================================================================

/// Batch commits against a file, with and without fsync.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/commit");

    for batch_size in [1u64, 10, 100] {
        group.throughput(Throughput::Elements(batch_size));
        for sync in [false, true] {
            let label = if sync { "fsync" } else { "no_fsync" };
            group.bench_with_input(BenchmarkId::new(label, batch_size), &batch_size, |b, &batch_size| {
                let dir = TempDir::new().expect("temp dir");
                let db = open_file(&dir, sync);
                populate(&db, 0, 1);
                let mut counter = 0u64;
                b.iter(|| {
                    let mut txn = db.write().expect("write txn");
                    for _ in 0..batch_size {
                        counter += 1;
                        txn.insert(BUCKET, &key(counter), b"value").expect("insert");
                    }
                    txn.commit().expect("commit");
                });
            });
        }
    }

    group.finish();
}

/// Commits with no journal underneath, isolating copy-on-write costs.
fn bench_commit_in_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/commit_in_memory");
    group.throughput(Throughput::Elements(100));

    group.bench_function("batch_100", |b| {
        let db = Database::<InMemoryBackend>::open_in_memory().expect("open");
        populate(&db, 10_000, 1_000);
        let mut counter = 10_000u64;
        b.iter(|| {
            let mut txn = db.write().expect("write txn");
            for _ in 0..100 {
                counter += 1;
                txn.insert(BUCKET, &key(counter), b"value").expect("insert");
            }
            txn.commit().expect("commit");
        });
    });

    group.finish();
}

// =============================================================================
// Reads
// =============================================================================

/// Point reads through a fresh snapshot each time.
fn bench_point_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/point_read");
    group.throughput(Throughput::Elements(1));

    for count in [1_000u64, 100_000] {
        let db = Database::<InMemoryBackend>::open_in_memory().expect("open");
        populate(&db, count, 1_000);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut i = 0u64;
            b.iter(|| {
                i = (i + 7919) % count;
                let txn = db.read().expect("read txn");
                black_box(txn.get(BUCKET, &key(i)).expect("get").map(<[u8]>::len))
            });
        });
    }

    group.finish();
}

/// Full bucket scans.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/scan");

    let db = Database::<InMemoryBackend>::open_in_memory().expect("open");
    populate(&db, 10_000, 1_000);
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("10k_entries", |b| {
        b.iter(|| {
            let txn = db.read().expect("read txn");
            black_box(txn.iter(BUCKET).expect("iter").count())
        });
    });

    group.finish();
}

// =============================================================================
// Compaction
// =============================================================================

/// Rewriting a journal made mostly of overwritten values.
fn bench_compaction(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/compaction");

    group.bench_function("overwritten_10k", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().expect("temp dir");
                let db = open_file(&dir, false);
                populate(&db, 1_000, 100);
                for _ in 0..9 {
                    populate_overwrite(&db, 1_000);
                }
                (dir, db)
            },
            |(_dir, db)| black_box(db.compact().expect("compact")),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

fn populate_overwrite(db: &Database<FileBackend>, count: u64) {
    let mut txn = db.write().expect("write txn");
    for i in 0..count {
        txn.insert(BUCKET, &key(i), b"overwritten").expect("insert");
    }
    txn.commit().expect("commit");
}

criterion_group! {
    name = commit_benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(50);
    targets = bench_commit, bench_commit_in_memory
}

criterion_group! {
    name = read_benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(100);
    targets = bench_point_read, bench_scan
}

criterion_group! {
    name = compaction_benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(10);
    targets = bench_compaction
}

criterion_main!(commit_benches, read_benches, compaction_benches);
