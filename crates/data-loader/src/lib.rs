//! # Data Loader Crate
//!
//! Reads the inputs of the rating graph: sharded rating CSV files and the
//! movie catalog, and keeps them in an in-memory index.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Rating, RatingMatrix, Movie, UserPair, SimilarityRecord)
//! - **parser**: Parse rating shards and the catalog CSV into Rust structs
//! - **ingest**: Read every shard matching a glob pattern on a bounded thread pool
//! - **index**: DataIndex, the in-memory catalog, ratings and similarity edges
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::RatingIngestor;
//!
//! let report = RatingIngestor::new().ingest("data/ratings_part_*.csv")?;
//! println!("{} ratings from {} shards", report.ratings.len(), report.shards_read);
//!
//! let matrix = report.into_matrix();
//! ```

// Public modules
pub mod error;
pub mod index;
pub mod ingest;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{DataLoadError, Result};
pub use index::DataIndex;
pub use ingest::{IngestReport, RatingIngestor};
pub use types::{
    // Type aliases
    MovieId,
    UserId,
    // Core types
    Movie,
    MovieStats,
    Rating,
    RatingMatrix,
    SimilarityRecord,
    UserPair,
    MAX_RATING,
    MIN_RATING,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("movies.csv");
        fs::write(
            &catalog,
            "id,title,year,duration,genres,directors\n\
             m1,Heat,1995,170,Action|Crime,Michael Mann\n\
             m2,Alien,1979,117,Horror|Sci-Fi,Ridley Scott\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("ratings_part_1.csv"),
            "userId,id,rating\n1,m1,5\n1,m2,3\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("ratings_part_2.csv"),
            "userId,id,rating\n2,m1,4\n",
        )
        .unwrap();

        let pattern = dir.path().join("ratings_part_*.csv").display().to_string();
        let index = DataIndex::load_from_files(&catalog, &pattern).unwrap();

        assert_eq!(index.counts(), (2, 2, 3));
        assert_eq!(index.get_movies_by_director("Ridley Scott"), &["m2".to_string()]);
        assert_eq!(index.directors(), vec!["Michael Mann", "Ridley Scott"]);
        assert_eq!(index.get_movie_stats("m1").unwrap().rating_count, 2);
    }

    #[test]
    fn test_load_rejects_ratings_for_unknown_movies() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("movies.csv");
        fs::write(&catalog, "id,title,year,duration,genres,directors\nm1,Heat,,,,\n").unwrap();
        fs::write(
            dir.path().join("ratings_part_1.csv"),
            "userId,id,rating\n1,m9,5\n",
        )
        .unwrap();

        let pattern = dir.path().join("ratings_part_*.csv").display().to_string();
        let err = DataIndex::load_from_files(&catalog, &pattern).unwrap_err();
        assert!(matches!(err, DataLoadError::MissingReference { .. }));
    }
}
