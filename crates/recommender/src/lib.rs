//! # Recommender Crate
//!
//! The online half of the system: turns a free-text query, or just a user
//! id, into ranked movie recommendations drawn from the graph store.
//!
//! ## Components
//!
//! - **lexicon**: localized genre phrases
//! - **criteria**: `CriteriaPlanner`, text to `Criteria`
//! - **preferences**: `PreferenceProfiler`, favorite genres, directors and movies
//! - **aggregator**: `RecommendationAggregator`, concurrent candidate queries
//!   and weighted score fusion
//! - **cache**: `CacheStore` and `RecommendationCache`
//! - **recommender**: `Recommender`, the facade wiring it all together
//!
//! ## Example Usage
//!
//! ```ignore
//! use recommender::{QueryOutcome, Recommender};
//!
//! let recommender = Recommender::new(store)?;
//! match recommender.process_query("algo como \"Heat\"", Some("42"), 10).await? {
//!     QueryOutcome::NoCriteria => println!("Ask for a genre, director or movie"),
//!     QueryOutcome::Recommendations(results) => {
//!         for rec in results.iter() {
//!             println!("{} ({:.2})", rec.movie.title, rec.score);
//!         }
//!     }
//! }
//! ```

pub mod aggregator;
pub mod cache;
pub mod criteria;
pub mod lexicon;
pub mod preferences;
pub mod recommender;

pub use aggregator::{
    AggregatorConfig, CriterionWeights, DedupKey, Recommendation, RecommendationAggregator,
};
pub use cache::{CacheConfig, CacheStore, RecommendationCache, SharedRecommendations};
pub use criteria::{Criteria, CriteriaPlanner};
pub use lexicon::GenreLexicon;
pub use preferences::PreferenceProfiler;
pub use recommender::{QueryOutcome, Recommender, RecommenderConfig};
