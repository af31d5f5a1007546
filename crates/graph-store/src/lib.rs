//! # Graph Store Crate
//!
//! Everything the recommender and the similarity loader need from the rating
//! graph, behind one async trait.
//!
//! ## Main Components
//!
//! - **store**: the `GraphStore` capability trait
//! - **types**: records exchanged with a store and the shared thresholds
//! - **neo4j**: `Neo4jGraphStore`, the production backend (neo4rs)
//! - **cypher**: the statements the Neo4j backend runs
//! - **memory**: `MemoryGraphStore`, an in-process backend over `DataIndex`
//! - **config**: `Neo4jConfig`, read from `NEO4J_*` environment variables

pub mod config;
pub mod cypher;
pub mod error;
pub mod memory;
pub mod neo4j;
pub mod store;
pub mod types;

pub use config::Neo4jConfig;
pub use error::{GraphStoreError, Result};
pub use memory::MemoryGraphStore;
pub use neo4j::Neo4jGraphStore;
pub use store::GraphStore;
pub use types::{
    CandidateRow, CombinedCriteria, CriterionKind, MovieDetails, TitleMatch, UserPreferences,
};
