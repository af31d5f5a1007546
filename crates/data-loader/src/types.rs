//! Core domain types for the rating graph.
//!
//! Identifiers are opaque strings: rating shards carry numeric user ids while
//! users registered through the application get generated ids, and movie ids
//! come from the external catalog.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Type Aliases
// =============================================================================

/// Opaque identifier of a user
pub type UserId = String;

/// Opaque identifier of a movie in the external catalog
pub type MovieId = String;

/// Lowest score a rating may carry
pub const MIN_RATING: f32 = 1.0;

/// Highest score a rating may carry
pub const MAX_RATING: f32 = 5.0;

// =============================================================================
// Ratings
// =============================================================================

/// A single rating from a user for a movie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Score from 1.0 to 5.0
    pub rating: f32,
}

impl Rating {
    /// True when `score` lies inside the accepted rating range
    pub fn is_valid_score(score: f32) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&score)
    }
}

/// Ratings folded per user: user -> (movie -> score)
///
/// This is the input of the similarity engine. A later rating for the same
/// `(user, movie)` overwrites the earlier one.
#[derive(Debug, Clone, Default)]
pub struct RatingMatrix {
    users: HashMap<UserId, HashMap<MovieId, f32>>,
}

impl RatingMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a flat sequence of ratings into the per-user map
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = Rating>,
    {
        let mut matrix = Self::new();
        for rating in ratings {
            matrix.insert(rating);
        }
        matrix
    }

    pub fn insert(&mut self, rating: Rating) {
        self.users
            .entry(rating.user_id)
            .or_default()
            .insert(rating.movie_id, rating.rating);
    }

    /// Ratings of one user, if the user rated anything
    pub fn get(&self, user_id: &str) -> Option<&HashMap<MovieId, f32>> {
        self.users.get(user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn rating_count(&self) -> usize {
        self.users.values().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Consume the matrix into a vector of users sorted by id.
    ///
    /// The similarity engine enumerates pairs by position in this vector, so
    /// the order has to be stable between runs.
    pub fn into_sorted_users(self) -> Vec<(UserId, HashMap<MovieId, f32>)> {
        let mut users: Vec<_> = self.users.into_iter().collect();
        users.sort_by(|a, b| a.0.cmp(&b.0));
        users
    }
}

// =============================================================================
// Movies
// =============================================================================

/// A movie from the external catalog (read-only to this workspace)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    pub year: Option<u16>,
    /// Running time in minutes
    pub duration: Option<u32>,
    pub genres: Vec<String>,
    pub directors: Vec<String>,
}

/// Aggregate rating statistics for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieStats {
    pub avg_rating: f64,
    pub rating_count: u32,
}

// =============================================================================
// Similarity edges
// =============================================================================

/// Key of an undirected similarity edge.
///
/// The two endpoints are stored in ascending order so `(a, b)` and `(b, a)`
/// address the same edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserPair {
    low: UserId,
    high: UserId,
}

impl UserPair {
    pub fn new(a: impl Into<UserId>, b: impl Into<UserId>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    pub fn is_self_pair(&self) -> bool {
        self.low == self.high
    }
}

/// One computed similarity, as streamed to the stager and stored in checkpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub user_a: UserId,
    pub user_b: UserId,
    pub similarity: f64,
}

impl SimilarityRecord {
    pub fn new(user_a: impl Into<UserId>, user_b: impl Into<UserId>, similarity: f64) -> Self {
        Self {
            user_a: user_a.into(),
            user_b: user_b.into(),
            similarity,
        }
    }

    pub fn pair(&self) -> UserPair {
        UserPair::new(self.user_a.clone(), self.user_b.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(user: &str, movie: &str, score: f32) -> Rating {
        Rating {
            user_id: user.to_string(),
            movie_id: movie.to_string(),
            rating: score,
        }
    }

    #[test]
    fn test_user_pair_is_unordered() {
        assert_eq!(UserPair::new("7", "3"), UserPair::new("3", "7"));
        let pair = UserPair::new("7", "3");
        assert_eq!(pair.low(), "3");
        assert_eq!(pair.high(), "7");
        assert!(UserPair::new("4", "4").is_self_pair());
    }

    #[test]
    fn test_matrix_overwrites_duplicate_ratings() {
        let matrix = RatingMatrix::from_ratings(vec![
            rating("1", "A", 2.0),
            rating("1", "A", 4.0),
            rating("2", "A", 3.0),
        ]);

        assert_eq!(matrix.user_count(), 2);
        assert_eq!(matrix.rating_count(), 2);
        assert_eq!(matrix.get("1").unwrap()["A"], 4.0);
    }

    #[test]
    fn test_sorted_users_are_stable() {
        let matrix = RatingMatrix::from_ratings(vec![
            rating("b", "A", 2.0),
            rating("c", "A", 4.0),
            rating("a", "A", 3.0),
        ]);
        let ids: Vec<UserId> = matrix.into_sorted_users().into_iter().map(|(u, _)| u).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rating_range() {
        assert!(Rating::is_valid_score(1.0));
        assert!(Rating::is_valid_score(5.0));
        assert!(!Rating::is_valid_score(0.5));
        assert!(!Rating::is_valid_score(5.5));
    }
}
