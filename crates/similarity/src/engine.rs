//! Pairwise user similarity.
//!
//! ## Algorithm
//! 1. Sort users by id so pair enumeration is stable between runs
//! 2. Walk the sorted users in fixed-size chunks
//! 3. For user `i` of a chunk, score every user `j > i` (no self pairs, no
//!    reversed duplicates)
//! 4. Stream every defined score to a sink; nothing is kept per chunk
//!
//! Scoring runs on a dedicated Rayon pool. Results cross a bounded channel to
//! the calling thread, which hands them to the sink one at a time, so a slow
//! sink applies back-pressure instead of growing memory.

use anyhow::{anyhow, Context, Result};
use data_loader::{MovieId, RatingMatrix, SimilarityRecord};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Variances below this are treated as zero
const VARIANCE_EPSILON: f64 = 1e-12;

/// Pearson correlation of two users over the movies both rated.
///
/// Returns `None` when they share fewer than `min_common` movies or when
/// either side has zero variance over the shared movies. The result is
/// clamped into [-1, 1] to absorb rounding.
pub fn pearson(
    a: &HashMap<MovieId, f32>,
    b: &HashMap<MovieId, f32>,
    min_common: usize,
) -> Option<f64> {
    let (small, large, swapped) = if a.len() <= b.len() {
        (a, b, false)
    } else {
        (b, a, true)
    };

    let common: Vec<(f64, f64)> = small
        .iter()
        .filter_map(|(movie_id, &x)| {
            let y = *large.get(movie_id)?;
            let (x, y) = (x as f64, y as f64);
            Some(if swapped { (y, x) } else { (x, y) })
        })
        .collect();

    if common.len() < min_common.max(1) {
        return None;
    }

    let n = common.len() as f64;
    let mean_a = common.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = common.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut numerator = 0.0;
    let mut sq_a = 0.0;
    let mut sq_b = 0.0;
    for (x, y) in &common {
        let dx = x - mean_a;
        let dy = y - mean_b;
        numerator += dx * dy;
        sq_a += dx * dx;
        sq_b += dy * dy;
    }

    let (denom_a, denom_b) = (sq_a.sqrt(), sq_b.sqrt());
    if denom_a < VARIANCE_EPSILON || denom_b < VARIANCE_EPSILON {
        return None;
    }
    Some((numerator / (denom_a * denom_b)).clamp(-1.0, 1.0))
}

/// Tuning knobs of the similarity engine
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Minimum shared movies for a pair to be scored (default: 3)
    pub min_common: usize,
    /// Users per outer chunk (default: 1,000)
    pub chunk_size: usize,
    /// Scoring threads (default: min(cores + 4, 16))
    pub workers: usize,
    /// Records buffered between the scorers and the sink (default: 10,000)
    pub channel_capacity: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            min_common: 3,
            chunk_size: 1_000,
            workers: (cores + 4).min(16),
            channel_capacity: 10_000,
        }
    }
}

/// Statistics of one compute run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComputeReport {
    pub users: usize,
    pub chunks: usize,
    pub pairs_evaluated: u64,
    pub similarities: u64,
    /// Checkpoint files written, filled in by the pipeline
    pub checkpoints: Vec<PathBuf>,
}

/// Computes Pearson similarity for every unordered pair of users
#[derive(Debug, Clone, Default)]
pub struct SimilarityEngine {
    config: SimilarityConfig,
}

impl SimilarityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SimilarityConfig) -> Self {
        Self { config }
    }

    /// Configure the minimum number of shared movies (default: 3)
    pub fn with_min_common(mut self, min_common: usize) -> Self {
        self.config.min_common = min_common;
        self
    }

    /// Configure how many users each outer chunk holds (default: 1,000)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size.max(1);
        self
    }

    /// Configure the number of scoring threads
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.config.workers = workers.max(1);
        self
    }

    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Score every pair and hand each defined similarity to `sink`.
    ///
    /// Stops at the first sink error and returns it.
    #[instrument(skip(self, matrix, sink), fields(users = matrix.user_count()))]
    pub fn compute<F>(&self, matrix: RatingMatrix, mut sink: F) -> Result<ComputeReport>
    where
        F: FnMut(SimilarityRecord) -> Result<()>,
    {
        let users = matrix.into_sorted_users();
        let n = users.len();
        let chunk_size = self.config.chunk_size.max(1);
        let min_common = self.config.min_common;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .context("Building similarity thread pool")?;

        let mut report = ComputeReport {
            users: n,
            chunks: n.div_ceil(chunk_size),
            ..Default::default()
        };
        info!(
            "Scoring {} users in {} chunks on {} threads",
            n, report.chunks, self.config.workers
        );

        for (chunk_idx, start) in (0..n).step_by(chunk_size).enumerate() {
            let end = (start + chunk_size).min(n);
            let chunk_start = Instant::now();
            let (tx, rx) = mpsc::sync_channel::<SimilarityRecord>(self.config.channel_capacity);

            let emitted = std::thread::scope(|scope| -> Result<u64> {
                let users = &users;
                let pool = &pool;
                let producer = scope.spawn(move || {
                    pool.install(|| {
                        (start..end).into_par_iter().try_for_each_with(tx, |tx, i| {
                            let (user_a, ratings_a) = &users[i];
                            for (user_b, ratings_b) in &users[i + 1..] {
                                if let Some(score) = pearson(ratings_a, ratings_b, min_common) {
                                    let record =
                                        SimilarityRecord::new(user_a.clone(), user_b.clone(), score);
                                    // The receiver only goes away when the sink failed
                                    tx.send(record).map_err(|_| ())?;
                                }
                            }
                            Ok::<(), ()>(())
                        })
                    })
                });

                let mut emitted = 0u64;
                for record in rx {
                    sink(record)?;
                    emitted += 1;
                }
                producer
                    .join()
                    .map_err(|_| anyhow!("Similarity worker panicked"))?
                    .map_err(|_| anyhow!("Similarity results were dropped"))?;
                Ok(emitted)
            })?;

            let pairs: u64 = (start..end).map(|i| (n - 1 - i) as u64).sum();
            report.pairs_evaluated += pairs;
            report.similarities += emitted;
            info!(
                "Chunk {}/{} (users {}-{}): {} similarities from {} pairs in {:.2?}",
                chunk_idx + 1,
                report.chunks,
                start + 1,
                end,
                emitted,
                pairs,
                chunk_start.elapsed()
            );
        }

        debug!(
            "Computed {} similarities from {} pairs",
            report.similarities, report.pairs_evaluated
        );
        Ok(report)
    }

    /// Score every pair and collect the results in memory, ordered by pair.
    ///
    /// Meant for tests and small corpora; large runs should stream through
    /// `compute` into a stager.
    pub fn compute_all(&self, matrix: RatingMatrix) -> Result<Vec<SimilarityRecord>> {
        let mut records = Vec::new();
        self.compute(matrix, |record| {
            records.push(record);
            Ok(())
        })?;
        records.sort_by(|a, b| a.user_a.cmp(&b.user_a).then_with(|| a.user_b.cmp(&b.user_b)));
        Ok(records)
    }
}
