//! Parallel ingestion of sharded rating files.
//!
//! Every shard matching the pattern is parsed independently on a bounded
//! Rayon pool. A malformed shard is logged and skipped; it never fails the
//! run.

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::{Rating, RatingMatrix};
use rayon::prelude::*;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Upper bound on shard reader threads
const MAX_INGEST_WORKERS: usize = 8;

/// Outcome of one ingestion run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ratings: Vec<Rating>,
    pub shards_read: usize,
    pub shards_skipped: usize,
    /// Rows dropped for an out-of-range score
    pub rows_dropped: usize,
}

impl IngestReport {
    /// Fold the flat ratings into user -> (movie -> rating)
    pub fn into_matrix(self) -> RatingMatrix {
        RatingMatrix::from_ratings(self.ratings)
    }
}

/// Reads rating shards selected by a glob pattern
#[derive(Debug, Clone)]
pub struct RatingIngestor {
    workers: usize,
}

impl RatingIngestor {
    /// Create an ingestor sized to `min(available parallelism, 8)`
    pub fn new() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers: cores.min(MAX_INGEST_WORKERS),
        }
    }

    /// Override the number of reader threads (minimum 1)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Read every shard matching `pattern`.
    ///
    /// Only a malformed pattern is an error; unreadable shards are counted in
    /// `shards_skipped`.
    #[instrument(skip(self), fields(workers = self.workers))]
    pub fn ingest(&self, pattern: &str) -> Result<IngestReport> {
        let start = Instant::now();
        let paths = shard_paths(pattern)?;
        info!("Found {} rating shards", paths.len());

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| DataLoadError::ValidationError(format!("ingest pool: {}", e)))?;

        let parsed: Vec<(PathBuf, Result<parser::ShardRatings>)> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| (path.clone(), parser::parse_rating_shard(path)))
                .collect()
        });

        let mut report = IngestReport::default();
        for (path, result) in parsed {
            match result {
                Ok(shard) => {
                    debug!(
                        "Read {} ratings from {} ({} dropped)",
                        shard.ratings.len(),
                        path.display(),
                        shard.dropped
                    );
                    report.shards_read += 1;
                    report.rows_dropped += shard.dropped;
                    report.ratings.extend(shard.ratings);
                }
                Err(e) => {
                    warn!("Skipping shard {}: {}", path.display(), e);
                    report.shards_skipped += 1;
                }
            }
        }

        info!(
            "Loaded {} ratings from {} shards in {:.2?} ({} skipped, {} rows dropped)",
            report.ratings.len(),
            report.shards_read,
            start.elapsed(),
            report.shards_skipped,
            report.rows_dropped
        );
        Ok(report)
    }
}

impl Default for RatingIngestor {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a glob pattern into a sorted list of shard paths
fn shard_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).map_err(|e| DataLoadError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(path),
            Ok(_) => {}
            Err(e) => warn!("Unreadable shard entry: {}", e),
        }
    }
    paths.sort();
    Ok(paths)
}
