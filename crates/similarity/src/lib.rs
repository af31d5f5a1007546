//! # Similarity Crate
//!
//! The offline half of the recommender: Pearson similarity between every pair
//! of users, staged to checkpoint files and bulk-loaded into the graph store
//! as SIMILAR edges.
//!
//! ## Components
//!
//! - **engine**: `pearson` and the chunked, parallel `SimilarityEngine`
//! - **stager**: `SimilarityStager`, checkpoint files and their readers
//! - **loader**: `SimilarityLoader`, batched upserts with retry and bisection
//! - **pipeline**: `SimilarityPipeline`, the two phases wired together
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::RatingIngestor;
//! use similarity::{SimilarityEngine, SimilarityLoader, SimilarityPipeline};
//!
//! let matrix = RatingIngestor::new().ingest("data/ratings_*.csv")?.into_matrix();
//! let pipeline = SimilarityPipeline::new(SimilarityEngine::new(), "checkpoints");
//! let (computed, loaded) = pipeline.run(matrix, &SimilarityLoader::new(store)).await?;
//! ```

pub mod engine;
pub mod loader;
pub mod pipeline;
pub mod stager;

pub use engine::{pearson, ComputeReport, SimilarityConfig, SimilarityEngine};
pub use loader::{LoadReport, LoaderConfig, SimilarityLoader};
pub use pipeline::SimilarityPipeline;
pub use stager::{discover_checkpoints, read_checkpoint, CheckpointRows, SimilarityStager};
