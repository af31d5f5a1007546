use crate::error::Result;
use crate::types::*;
use data_loader::SimilarityRecord;

/// Capabilities the recommender and the similarity loader need from the
/// rating graph.
///
/// Implemented by `Neo4jGraphStore` (production) and `MemoryGraphStore`
/// (tests, small local corpora). Every call is independent; callers may issue
/// them concurrently.
#[async_trait::async_trait]
pub trait GraphStore: Send + Sync {
    /// Every genre name, sorted
    async fn all_genres(&self) -> Result<Vec<String>>;

    /// Every director name, sorted
    async fn all_directors(&self) -> Result<Vec<String>>;

    /// Movies whose title equals one of `titles`
    async fn movie_ids_by_titles(&self, titles: &[String]) -> Result<Vec<TitleMatch>>;

    /// Movies whose title contains, or is contained in, one of `fragments`
    /// (case-insensitive), at most `limit`
    async fn movie_ids_by_title_fragments(
        &self,
        fragments: &[String],
        limit: usize,
    ) -> Result<Vec<TitleMatch>>;

    /// Candidates for a single criterion.
    ///
    /// Only movies with more than `MIN_RATERS` ratings are returned, and when
    /// `user` is set, never one that user already rated. Rows come back
    /// ordered by matches, then average rating.
    async fn criterion_candidates(
        &self,
        kind: CriterionKind,
        values: &[String],
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CandidateRow>>;

    /// Candidates satisfying every active criterion at once (intersection).
    ///
    /// `matches` on each row is the number of active criteria.
    async fn combined_candidates(
        &self,
        criteria: &CombinedCriteria,
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CandidateRow>>;

    /// Full records for the movies with the given titles. A title shared by
    /// several movies yields several records.
    async fn movie_details(&self, titles: &[String]) -> Result<Vec<MovieDetails>>;

    /// Preference profile of a user, `None` for an unknown user
    async fn user_preferences(&self, user: &str) -> Result<Option<UserPreferences>>;

    /// Merge one undirected SIMILAR edge per record and set its score.
    ///
    /// Records naming an unknown user match nothing and are silently ignored.
    /// Returns the number of edges written.
    async fn upsert_similarities(&self, records: &[SimilarityRecord]) -> Result<u64>;
}
