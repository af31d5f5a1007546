//! Durable checkpoints between computing and loading similarities.
//!
//! Records are buffered and written out as `similarities_batch_{n}.csv`
//! (header `user_a,user_b,similarity`) once the buffer reaches its threshold,
//! plus one final file for the remainder. Every file stands on its own, so a
//! failed load can be resumed from whatever is on disk.

use anyhow::{Context, Result};
use data_loader::SimilarityRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CHECKPOINT_PREFIX: &str = "similarities_batch_";
const CHECKPOINT_SUFFIX: &str = ".csv";

/// Records buffered before a checkpoint is written
pub const DEFAULT_STAGE_THRESHOLD: usize = 100_000;

/// Buffers similarity records and writes them as checkpoint files
#[derive(Debug)]
pub struct SimilarityStager {
    dir: PathBuf,
    threshold: usize,
    buffer: Vec<SimilarityRecord>,
    next_batch: u64,
    files: Vec<PathBuf>,
    staged: u64,
}

impl SimilarityStager {
    /// Create a stager writing into `dir` (created if missing).
    ///
    /// Batch numbers continue after the highest checkpoint already present, so
    /// existing files are never overwritten.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Creating checkpoint directory {}", dir.display()))?;
        let next_batch = discover_checkpoints(&dir)?
            .iter()
            .filter_map(|path| batch_number(path))
            .max()
            .map_or(1, |n| n + 1);

        Ok(Self {
            dir,
            threshold: DEFAULT_STAGE_THRESHOLD,
            buffer: Vec::new(),
            next_batch,
            files: Vec::new(),
            staged: 0,
        })
    }

    /// Configure how many records trigger a checkpoint (default: 100,000)
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    /// Records accepted so far
    pub fn staged(&self) -> u64 {
        self.staged
    }

    pub fn push(&mut self, record: SimilarityRecord) -> Result<()> {
        self.buffer.push(record);
        self.staged += 1;
        if self.buffer.len() >= self.threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the remainder and return every checkpoint written by this stager
    pub fn finish(mut self) -> Result<Vec<PathBuf>> {
        self.flush()?;
        info!(
            "Staged {} similarities in {} checkpoint files",
            self.staged,
            self.files.len()
        );
        Ok(self.files)
    }

    fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let path = self.dir.join(format!(
            "{}{}{}",
            CHECKPOINT_PREFIX, self.next_batch, CHECKPOINT_SUFFIX
        ));

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Creating checkpoint {}", path.display()))?;
        for record in &self.buffer {
            writer
                .serialize(record)
                .with_context(|| format!("Writing checkpoint {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("Flushing checkpoint {}", path.display()))?;

        debug!("Wrote {} records to {}", self.buffer.len(), path.display());
        self.buffer.clear();
        self.files.push(path);
        self.next_batch += 1;
        Ok(())
    }
}

/// Rows recovered from one checkpoint file
#[derive(Debug, Default)]
pub struct CheckpointRows {
    pub records: Vec<SimilarityRecord>,
    /// Rows that could not be decoded or carried an impossible score
    pub corrupt: usize,
}

/// Read a checkpoint file, skipping corrupt rows.
///
/// Fails only when the file itself cannot be opened.
pub fn read_checkpoint(path: &Path) -> Result<CheckpointRows> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Opening checkpoint {}", path.display()))?;

    let mut rows = CheckpointRows::default();
    for (line, row) in reader.deserialize::<SimilarityRecord>().enumerate() {
        match row {
            Ok(record) if record.similarity.is_finite() && record.similarity.abs() <= 1.0 => {
                rows.records.push(record)
            }
            Ok(record) => {
                warn!(
                    "Skipping row {} of {}: similarity {} out of range",
                    line + 2,
                    path.display(),
                    record.similarity
                );
                rows.corrupt += 1;
            }
            Err(e) => {
                warn!("Skipping corrupt row in {}: {}", path.display(), e);
                rows.corrupt += 1;
            }
        }
    }
    Ok(rows)
}

/// Checkpoint files already present in `dir`, in batch order.
///
/// A missing directory yields an empty list.
pub fn discover_checkpoints(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut found: Vec<(u64, PathBuf)> = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Listing checkpoints in {}", dir.display()))?
    {
        let path = entry?.path();
        if let Some(n) = batch_number(&path) {
            found.push((n, path));
        }
    }
    found.sort();
    Ok(found.into_iter().map(|(_, path)| path).collect())
}

/// `similarities_batch_12.csv` -> 12
fn batch_number(path: &Path) -> Option<u64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(CHECKPOINT_PREFIX)?
        .strip_suffix(CHECKPOINT_SUFFIX)?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(a: &str, b: &str, s: f64) -> SimilarityRecord {
        SimilarityRecord::new(a, b, s)
    }

    #[test]
    fn test_flushes_at_threshold_and_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut stager = SimilarityStager::new(dir.path()).unwrap().with_threshold(2);
        for i in 0..5 {
            stager.push(record("a", &format!("b{}", i), 0.5)).unwrap();
        }
        assert_eq!(stager.staged(), 5);
        let files = stager.finish().unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "similarities_batch_1.csv",
                "similarities_batch_2.csv",
                "similarities_batch_3.csv"
            ]
        );
        assert_eq!(read_checkpoint(&files[2]).unwrap().records.len(), 1);

        let header = fs::read_to_string(&files[0]).unwrap();
        assert!(header.starts_with("user_a,user_b,similarity"));
    }

    #[test]
    fn test_nothing_staged_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let stager = SimilarityStager::new(dir.path()).unwrap();
        assert!(stager.finish().unwrap().is_empty());
        assert!(discover_checkpoints(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_numbering_continues_after_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = SimilarityStager::new(dir.path()).unwrap();
        first.push(record("a", "b", 0.1)).unwrap();
        first.finish().unwrap();

        let mut second = SimilarityStager::new(dir.path()).unwrap();
        second.push(record("a", "c", 0.2)).unwrap();
        let files = second.finish().unwrap();
        assert!(files[0].ends_with("similarities_batch_2.csv"));
    }

    #[test]
    fn test_corrupt_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("similarities_batch_1.csv");
        fs::write(
            &path,
            "user_a,user_b,similarity\n1,2,0.5\n1,3,abc\n1,4\n2,3,7.5\n2,4,-0.25\n",
        )
        .unwrap();

        let rows = read_checkpoint(&path).unwrap();
        assert_eq!(rows.records.len(), 2);
        assert_eq!(rows.corrupt, 3);
        assert_eq!(rows.records[1], record("2", "4", -0.25));
    }

    #[test]
    fn test_discover_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "similarities_batch_10.csv",
            "similarities_batch_2.csv",
            "notes.txt",
            "similarities_batch_x.csv",
        ] {
            fs::write(dir.path().join(name), "user_a,user_b,similarity\n").unwrap();
        }

        let found = discover_checkpoints(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].ends_with("similarities_batch_2.csv"));
        assert!(found[1].ends_with("similarities_batch_10.csv"));
    }

    #[test]
    fn test_missing_dir_has_no_checkpoints() {
        let found = discover_checkpoints(Path::new("/no/such/checkpoint/dir")).unwrap();
        assert!(found.is_empty());
    }
}
