//! Error types for the data-loader crate.
//!
//! Shard and catalog readers return these; callers that treat bad input as
//! skippable (the ingestor, the checkpoint reader) log them and move on.

use thiserror::Error;

/// Errors that can occur while reading rating shards, catalogs and checkpoints
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// File could not be found or opened
    #[error("Failed to open file: {path}")]
    FileNotFound { path: String },

    /// I/O error occurred while reading file
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A CSV record couldn't be decoded
    ///
    /// `line` is the 1-based line of the offending record when the reader knows it.
    #[error("Parse error at line {line} in {file}: {reason}")]
    ParseError {
        file: String,
        line: u64,
        reason: String,
    },

    /// A data field had an invalid value
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    /// The shard glob pattern itself is malformed
    #[error("Invalid shard pattern {pattern}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Referenced entity doesn't exist (e.g., rating for non-existent movie)
    #[error("Missing reference: {entity} with id {id}")]
    MissingReference { entity: String, id: String },

    /// Data validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DataLoadError {
    /// Wrap a `csv::Error` raised while reading `file`, keeping the line number.
    pub(crate) fn from_csv(file: &str, err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                DataLoadError::FileNotFound {
                    path: file.to_string(),
                }
            }
            csv::ErrorKind::Io(io) => DataLoadError::IoError(io),
            _ => DataLoadError::ParseError {
                file: file.to_string(),
                line,
                reason,
            },
        }
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
