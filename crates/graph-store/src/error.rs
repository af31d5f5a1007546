use thiserror::Error;

/// Errors raised by graph store backends
#[derive(Error, Debug)]
pub enum GraphStoreError {
    /// The backend could not be reached
    #[error("Failed to connect to graph store: {0}")]
    Connection(String),

    /// A statement was rejected or failed while running
    #[error("Query failed: {0}")]
    Query(String),

    /// A returned row did not have the expected shape
    #[error("Unexpected row shape: {0}")]
    Decode(String),

    /// Connection settings could not be read
    #[error("Invalid graph store configuration: {0}")]
    Config(String),
}

impl From<neo4rs::Error> for GraphStoreError {
    fn from(err: neo4rs::Error) -> Self {
        GraphStoreError::Query(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphStoreError>;
