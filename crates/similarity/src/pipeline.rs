//! Offline similarity pipeline: compute to checkpoints, then load.
//!
//! The two phases are independent. `compute` leaves checkpoint files on disk
//! and `load` accepts any list of them, so a failed or partial load can be
//! resumed without recomputing.

use crate::engine::{ComputeReport, SimilarityEngine};
use crate::loader::{LoadReport, SimilarityLoader};
use crate::stager::{discover_checkpoints, SimilarityStager, DEFAULT_STAGE_THRESHOLD};
use anyhow::{ensure, Context, Result};
use data_loader::RatingMatrix;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, instrument};

pub struct SimilarityPipeline {
    engine: SimilarityEngine,
    checkpoint_dir: PathBuf,
    stage_threshold: usize,
}

impl SimilarityPipeline {
    pub fn new(engine: SimilarityEngine, checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            checkpoint_dir: checkpoint_dir.into(),
            stage_threshold: DEFAULT_STAGE_THRESHOLD,
        }
    }

    /// Configure how many records go into each checkpoint (default: 100,000)
    pub fn with_stage_threshold(mut self, threshold: usize) -> Self {
        self.stage_threshold = threshold.max(1);
        self
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Phase 1: score every pair and stage the results as checkpoint files
    #[instrument(skip(self, matrix), fields(users = matrix.user_count()))]
    pub async fn compute(&self, matrix: RatingMatrix) -> Result<ComputeReport> {
        let start = Instant::now();
        let engine = self.engine.clone();
        let dir = self.checkpoint_dir.clone();
        let threshold = self.stage_threshold;

        let report = tokio::task::spawn_blocking(move || -> Result<ComputeReport> {
            let mut stager = SimilarityStager::new(dir)?.with_threshold(threshold);
            let mut report = engine.compute(matrix, |record| stager.push(record))?;
            ensure!(
                stager.staged() == report.similarities,
                "Staged {} of {} similarities",
                stager.staged(),
                report.similarities
            );
            report.checkpoints = stager.finish()?;
            Ok(report)
        })
        .await
        .context("Similarity computation task failed")??;

        info!(
            "Computed {} similarities for {} users into {} checkpoints in {:.2?}",
            report.similarities,
            report.users,
            report.checkpoints.len(),
            start.elapsed()
        );
        Ok(report)
    }

    /// Phase 2: load the given checkpoint files into the graph store
    pub async fn load(&self, loader: &SimilarityLoader, files: &[PathBuf]) -> LoadReport {
        loader.load_files(files).await
    }

    /// Phase 2 over every checkpoint already in the checkpoint directory
    pub async fn load_existing(&self, loader: &SimilarityLoader) -> Result<LoadReport> {
        let files = discover_checkpoints(&self.checkpoint_dir)?;
        info!(
            "Found {} checkpoints in {}",
            files.len(),
            self.checkpoint_dir.display()
        );
        Ok(self.load(loader, &files).await)
    }

    /// Both phases back to back
    pub async fn run(
        &self,
        matrix: RatingMatrix,
        loader: &SimilarityLoader,
    ) -> Result<(ComputeReport, LoadReport)> {
        let computed = self.compute(matrix).await?;
        let loaded = self.load(loader, &computed.checkpoints).await;
        Ok((computed, loaded))
    }
}
