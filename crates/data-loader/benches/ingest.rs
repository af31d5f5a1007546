//! Benchmarks for shard ingestion
//!
//! Run with: cargo bench --package data-loader
//!
//! Writes a synthetic set of rating shards to a temp dir and measures how long
//! the ingestor takes to read them with different worker counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use data_loader::RatingIngestor;
use std::fmt::Write as _;
use std::fs;

const SHARDS: usize = 8;
const USERS_PER_SHARD: usize = 250;
const MOVIES: usize = 400;

fn write_shards(dir: &tempfile::TempDir) -> String {
    for shard in 0..SHARDS {
        let mut contents = String::from("userId,id,rating\n");
        for u in 0..USERS_PER_SHARD {
            let user = shard * USERS_PER_SHARD + u;
            for m in (user % 7..MOVIES).step_by(9) {
                let score = 1 + (user * 31 + m * 17) % 5;
                writeln!(contents, "{},m{},{}", user, m, score).unwrap();
            }
        }
        fs::write(dir.path().join(format!("ratings_part_{}.csv", shard)), contents).unwrap();
    }
    dir.path().join("ratings_part_*.csv").display().to_string()
}

fn bench_ingest(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temp dir");
    let pattern = write_shards(&dir);

    let mut group = c.benchmark_group("ingest_shards");
    for workers in [1, 4, 8] {
        let ingestor = RatingIngestor::new().with_workers(workers);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &pattern, |b, pattern| {
            b.iter(|| {
                let report = ingestor.ingest(black_box(pattern)).unwrap();
                black_box(report.into_matrix())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
