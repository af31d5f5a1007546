//! Records exchanged with a graph store.

use data_loader::MovieId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A candidate must have strictly more raters than this to be recommended
pub const MIN_RATERS: i64 = 5;

/// Similarity edges at or below this score are not followed
pub const SIMILAR_USER_MIN_SCORE: f64 = 0.3;

/// Peer ratings at or below this score do not count as endorsements
pub const PEER_MIN_RATING: f64 = 3.5;

/// Ratings above this mark a genre or director as a favorite
pub const FAVORITE_MIN_RATING: f64 = 4.0;

/// Ratings above this mark a movie as a favorite
pub const FAVORITE_MOVIE_MIN_RATING: f64 = 4.5;

/// How many favorites of each kind a preference profile keeps
pub const PREFERENCE_TOP_N: usize = 3;

/// The single-criterion queries a store answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriterionKind {
    /// Movies in any of the given genres, ranked by how many they match
    Genre,
    /// Movies by any of the given directors
    Director,
    /// Movies sharing genres with the given reference movie ids
    SimilarItem,
    /// Movies liked by users similar to the requester (values are ignored)
    SimilarUser,
}

impl CriterionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CriterionKind::Genre => "genre",
            CriterionKind::Director => "director",
            CriterionKind::SimilarItem => "similar_item",
            CriterionKind::SimilarUser => "similar_user",
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate movie returned by a criterion query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub movie_id: MovieId,
    pub title: String,
    /// How strongly the movie matched (shared genres, matching directors,
    /// endorsing peers, or satisfied criteria for a combined query)
    pub matches: f64,
    pub avg_rating: f64,
    pub rating_count: i64,
}

/// Structural criteria that must all hold at once
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedCriteria {
    pub genres: Vec<String>,
    pub directors: Vec<String>,
    /// Reference movie ids
    pub similar_items: Vec<MovieId>,
}

impl CombinedCriteria {
    /// Number of non-empty criteria
    pub fn active_count(&self) -> usize {
        [
            !self.genres.is_empty(),
            !self.directors.is_empty(),
            !self.similar_items.is_empty(),
        ]
        .iter()
        .filter(|&&active| active)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.active_count() == 0
    }
}

/// A movie id resolved from a title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMatch {
    pub id: MovieId,
    pub title: String,
}

/// A hydrated movie record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: MovieId,
    pub title: String,
    pub year: Option<i64>,
    pub duration: Option<i64>,
    pub genres: Vec<String>,
    pub directors: Vec<String>,
    /// `None` when nobody rated the movie
    pub avg_rating: Option<f64>,
    pub rating_count: i64,
}

/// What a user tends to like, derived from their ratings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub favorite_genres: Vec<String>,
    pub favorite_directors: Vec<String>,
    pub favorite_movies: Vec<MovieId>,
}

impl UserPreferences {
    pub fn is_empty(&self) -> bool {
        self.favorite_genres.is_empty()
            && self.favorite_directors.is_empty()
            && self.favorite_movies.is_empty()
    }
}
