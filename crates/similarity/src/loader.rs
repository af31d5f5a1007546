//! Bulk import of checkpoint files into the graph store.
//!
//! ## Failure policy
//! 1. Each sub-batch is upserted with up to `max_attempts` tries and a fixed
//!    delay between them
//! 2. A sub-batch that still fails is split in half; each half gets the same
//!    retry policy
//! 3. A half that still fails is a permanent failure: its rows are counted as
//!    dropped and the load moves on
//!
//! The load never aborts. Upserts are idempotent, so loading a file twice
//! leaves the graph unchanged.

use crate::stager::read_checkpoint;
use data_loader::SimilarityRecord;
use graph_store::{GraphStore, GraphStoreError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// Tuning knobs of the loader
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Rows per upsert (default: 1,000)
    pub batch_size: usize,
    /// Tries per batch before bisecting (default: 3)
    pub max_attempts: u32,
    /// Fixed pause between tries (default: 1s)
    pub retry_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1_000,
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Outcome of a load run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub files_loaded: usize,
    /// Checkpoints that could not be opened
    pub files_skipped: usize,
    /// Valid rows read from checkpoints
    pub rows_read: u64,
    /// Corrupt rows skipped while reading
    pub rows_corrupt: u64,
    /// Rows in batches the store accepted
    pub rows_written: u64,
    /// Edges the store reports as merged (rows naming unknown users match nothing)
    pub edges_upserted: u64,
    /// Rows in batches that failed permanently
    pub rows_dropped: u64,
    pub failed_batches: u64,
}

/// Streams checkpoint rows into a graph store
pub struct SimilarityLoader {
    store: Arc<dyn GraphStore>,
    config: LoaderConfig,
}

impl SimilarityLoader {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            config: LoaderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure rows per upsert (default: 1,000)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size.max(1);
        self
    }

    /// Configure tries per batch (default: 3)
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Configure the pause between tries (default: 1s)
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Load every checkpoint file in order
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn load_files(&self, files: &[PathBuf]) -> LoadReport {
        let start = Instant::now();
        let mut report = LoadReport::default();

        for (i, path) in files.iter().enumerate() {
            let read_path = path.clone();
            let rows = tokio::task::spawn_blocking(move || read_checkpoint(&read_path)).await;
            let rows = match rows {
                Ok(Ok(rows)) => rows,
                Ok(Err(e)) => {
                    warn!("Skipping checkpoint {}: {:#}", path.display(), e);
                    report.files_skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Skipping checkpoint {}: reader failed: {}", path.display(), e);
                    report.files_skipped += 1;
                    continue;
                }
            };

            report.rows_read += rows.records.len() as u64;
            report.rows_corrupt += rows.corrupt as u64;
            self.load_records(&rows.records, &mut report).await;
            report.files_loaded += 1;
            info!(
                "Loaded checkpoint {}/{} {} ({} rows)",
                i + 1,
                files.len(),
                path.display(),
                rows.records.len()
            );
        }

        info!(
            "Load finished in {:.2?}: {} rows written, {} edges upserted, {} rows dropped in {} failed batches",
            start.elapsed(),
            report.rows_written,
            report.edges_upserted,
            report.rows_dropped,
            report.failed_batches
        );
        report
    }

    /// Upsert records in sub-batches, accumulating into `report`
    pub async fn load_records(&self, records: &[SimilarityRecord], report: &mut LoadReport) {
        for batch in records.chunks(self.config.batch_size.max(1)) {
            match self.upsert_with_retry(batch).await {
                Ok(edges) => {
                    report.rows_written += batch.len() as u64;
                    report.edges_upserted += edges;
                }
                Err(e) => {
                    warn!(
                        "Batch of {} rows failed after {} attempts, bisecting: {}",
                        batch.len(),
                        self.config.max_attempts,
                        e
                    );
                    self.load_bisected(batch, report).await;
                }
            }
        }
    }

    async fn load_bisected(&self, batch: &[SimilarityRecord], report: &mut LoadReport) {
        if batch.len() < 2 {
            error!("Dropping unloadable row {:?}", batch.first().map(|r| r.pair()));
            report.rows_dropped += batch.len() as u64;
            report.failed_batches += 1;
            return;
        }
        let (left, right) = batch.split_at(batch.len() / 2);
        for half in [left, right] {
            match self.upsert_with_retry(half).await {
                Ok(edges) => {
                    report.rows_written += half.len() as u64;
                    report.edges_upserted += edges;
                }
                Err(e) => {
                    error!("Dropping {} rows permanently: {}", half.len(), e);
                    report.rows_dropped += half.len() as u64;
                    report.failed_batches += 1;
                }
            }
        }
    }

    async fn upsert_with_retry(&self, batch: &[SimilarityRecord]) -> Result<u64, GraphStoreError> {
        let mut attempt = 1;
        loop {
            match self.store.upsert_similarities(batch).await {
                Ok(edges) => {
                    debug!("Upserted {} rows ({} edges) on attempt {}", batch.len(), edges, attempt);
                    return Ok(edges);
                }
                Err(e) if attempt < self.config.max_attempts => {
                    debug!("Upsert attempt {} failed: {}", attempt, e);
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graph_store::{
        CandidateRow, CombinedCriteria, CriterionKind, MovieDetails, Result as StoreResult,
        TitleMatch, UserPreferences,
    };
    use std::sync::Mutex;

    /// Rejects any batch containing a poisoned user and records batch sizes
    struct PickyStore {
        poisoned: &'static str,
        calls: Mutex<Vec<usize>>,
    }

    impl PickyStore {
        fn new(poisoned: &'static str) -> Self {
            Self {
                poisoned,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GraphStore for PickyStore {
        async fn all_genres(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn all_directors(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
        async fn movie_ids_by_titles(&self, _: &[String]) -> StoreResult<Vec<TitleMatch>> {
            Ok(Vec::new())
        }
        async fn movie_ids_by_title_fragments(
            &self,
            _: &[String],
            _: usize,
        ) -> StoreResult<Vec<TitleMatch>> {
            Ok(Vec::new())
        }
        async fn criterion_candidates(
            &self,
            _: CriterionKind,
            _: &[String],
            _: Option<&str>,
            _: usize,
        ) -> StoreResult<Vec<CandidateRow>> {
            Ok(Vec::new())
        }
        async fn combined_candidates(
            &self,
            _: &CombinedCriteria,
            _: Option<&str>,
            _: usize,
        ) -> StoreResult<Vec<CandidateRow>> {
            Ok(Vec::new())
        }
        async fn movie_details(&self, _: &[String]) -> StoreResult<Vec<MovieDetails>> {
            Ok(Vec::new())
        }
        async fn user_preferences(&self, _: &str) -> StoreResult<Option<UserPreferences>> {
            Ok(None)
        }
        async fn upsert_similarities(&self, records: &[SimilarityRecord]) -> StoreResult<u64> {
            self.calls.lock().unwrap().push(records.len());
            if records.iter().any(|r| r.user_a == self.poisoned) {
                return Err(GraphStoreError::Query("deadlock detected".to_string()));
            }
            Ok(records.len() as u64)
        }
    }

    fn records(n: usize) -> Vec<SimilarityRecord> {
        (0..n)
            .map(|i| SimilarityRecord::new(format!("u{}", i), format!("v{}", i), 0.5))
            .collect()
    }

    #[tokio::test]
    async fn test_clean_load_uses_one_call_per_batch() {
        let store = Arc::new(PickyStore::new("nobody"));
        let loader = SimilarityLoader::new(store.clone()).with_batch_size(4);

        let mut report = LoadReport::default();
        loader.load_records(&records(10), &mut report).await;

        assert_eq!(*store.calls.lock().unwrap(), vec![4, 4, 2]);
        assert_eq!(report.rows_written, 10);
        assert_eq!(report.edges_upserted, 10);
        assert_eq!(report.rows_dropped, 0);
    }

    #[tokio::test]
    async fn test_failing_batch_is_retried_then_bisected() {
        let store = Arc::new(PickyStore::new("u1"));
        let loader = SimilarityLoader::new(store.clone())
            .with_batch_size(4)
            .with_retry_delay(Duration::from_millis(1));

        let mut report = LoadReport::default();
        loader.load_records(&records(8), &mut report).await;

        // first batch: 3 tries at 4 rows, then the bad half 3 times and the
        // good half once; second batch loads cleanly
        assert_eq!(
            *store.calls.lock().unwrap(),
            vec![4, 4, 4, 2, 2, 2, 2, 4]
        );
        assert_eq!(report.rows_written, 6);
        assert_eq!(report.rows_dropped, 2);
        assert_eq!(report.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_single_row_failure_is_dropped() {
        let store = Arc::new(PickyStore::new("u0"));
        let loader = SimilarityLoader::new(store)
            .with_batch_size(1)
            .with_max_attempts(2)
            .with_retry_delay(Duration::ZERO);

        let mut report = LoadReport::default();
        loader.load_records(&records(3), &mut report).await;

        assert_eq!(report.rows_written, 2);
        assert_eq!(report.rows_dropped, 1);
        assert_eq!(report.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_missing_checkpoint_is_skipped() {
        let store = Arc::new(PickyStore::new("nobody"));
        let loader = SimilarityLoader::new(store);
        let report = loader
            .load_files(&[PathBuf::from("/no/such/similarities_batch_1.csv")])
            .await;

        assert_eq!(report.files_skipped, 1);
        assert_eq!(report.files_loaded, 0);
    }
}
