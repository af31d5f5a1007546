//! DataIndex: an in-memory rating graph.
//!
//! Holds the movie catalog, every rating in both directions and the
//! similarity edges between users, plus secondary indices (genre, director,
//! title) for the lookups the recommender performs. The in-memory graph store
//! is built on top of it.

use crate::error::{DataLoadError, Result};
use crate::ingest::RatingIngestor;
use crate::parser;
use crate::types::*;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::info;

#[derive(Debug, Default)]
pub struct DataIndex {
    // Primary data stores
    movies: HashMap<MovieId, Movie>,
    users: HashSet<UserId>,

    // Rating indices
    /// Every rating made by each user
    user_ratings: HashMap<UserId, HashMap<MovieId, f32>>,
    /// Every rating received by each movie
    movie_ratings: HashMap<MovieId, HashMap<UserId, f32>>,

    // Secondary indices (one movie can appear under several keys)
    genre_index: HashMap<String, Vec<MovieId>>,
    director_index: HashMap<String, Vec<MovieId>>,
    title_index: HashMap<String, Vec<MovieId>>,

    // Similarity edges, keyed by unordered pair
    similarities: HashMap<UserPair, f64>,
    neighbours: HashMap<UserId, HashSet<UserId>>,
}

impl DataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a movie catalog and every rating shard matching `ratings_pattern`.
    ///
    /// Catalog parsing and shard ingestion run in parallel.
    pub fn load_from_files(catalog: &Path, ratings_pattern: &str) -> Result<Self> {
        info!("Loading catalog {:?} and ratings {}", catalog, ratings_pattern);

        let (movies, ingest) = rayon::join(
            || parser::parse_movies(catalog),
            || RatingIngestor::new().ingest(ratings_pattern),
        );
        let movies = movies?;
        let ingest = ingest?;

        let mut index = DataIndex::new();
        for movie in movies {
            index.insert_movie(movie);
        }
        for rating in ingest.ratings {
            index.insert_rating(rating);
        }

        index.validate()?;

        let (users, movies, ratings) = index.counts();
        info!("Loaded {} users, {} movies, {} ratings", users, movies, ratings);
        Ok(index)
    }

    // Getters

    pub fn get_movie(&self, id: &str) -> Option<&Movie> {
        self.movies.get(id)
    }

    pub fn movies(&self) -> impl Iterator<Item = &Movie> {
        self.movies.values()
    }

    pub fn contains_user(&self, id: &str) -> bool {
        self.users.contains(id)
    }

    /// All ratings made by a user
    pub fn get_user_ratings(&self, user_id: &str) -> Option<&HashMap<MovieId, f32>> {
        self.user_ratings.get(user_id)
    }

    pub fn has_rated(&self, user_id: &str, movie_id: &str) -> bool {
        self.user_ratings
            .get(user_id)
            .is_some_and(|ratings| ratings.contains_key(movie_id))
    }

    pub fn get_movies_by_genre(&self, genre: &str) -> &[MovieId] {
        self.genre_index
            .get(genre)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn get_movies_by_director(&self, director: &str) -> &[MovieId] {
        self.director_index
            .get(director)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Movies whose title matches exactly
    pub fn get_movies_by_title(&self, title: &str) -> &[MovieId] {
        self.title_index
            .get(title)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every genre name in the catalog, sorted
    pub fn genres(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.genre_index.keys().collect();
        names.into_iter().cloned().collect()
    }

    /// Every director name in the catalog, sorted
    pub fn directors(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self.director_index.keys().collect();
        names.into_iter().cloned().collect()
    }

    /// Average rating and rater count of a movie, `None` when nobody rated it
    pub fn get_movie_stats(&self, movie_id: &str) -> Option<MovieStats> {
        let ratings = self.movie_ratings.get(movie_id)?;
        if ratings.is_empty() {
            return None;
        }
        let total: f64 = ratings.values().map(|&r| r as f64).sum();
        Some(MovieStats {
            avg_rating: total / ratings.len() as f64,
            rating_count: ratings.len() as u32,
        })
    }

    pub fn get_similarity(&self, a: &str, b: &str) -> Option<f64> {
        self.similarities.get(&UserPair::new(a, b)).copied()
    }

    /// Users linked to `user_id` by a similarity edge, with the edge score
    pub fn similar_users(&self, user_id: &str) -> Vec<(&str, f64)> {
        let Some(neighbours) = self.neighbours.get(user_id) else {
            return Vec::new();
        };
        let mut similar: Vec<(&str, f64)> = neighbours
            .iter()
            .filter_map(|other| {
                self.similarities
                    .get(&UserPair::new(user_id, other.as_str()))
                    .map(|&score| (other.as_str(), score))
            })
            .collect();
        similar.sort_by(|a, b| a.0.cmp(b.0));
        similar
    }

    pub fn similarity_count(&self) -> usize {
        self.similarities.len()
    }

    // Mutators

    pub fn insert_user(&mut self, user_id: impl Into<UserId>) {
        self.users.insert(user_id.into());
    }

    /// Insert or replace a movie and keep the secondary indices in sync
    pub fn insert_movie(&mut self, movie: Movie) {
        if let Some(previous) = self.movies.remove(&movie.id) {
            self.unindex_movie(&previous);
        }
        for genre in &movie.genres {
            self.genre_index
                .entry(genre.clone())
                .or_default()
                .push(movie.id.clone());
        }
        for director in &movie.directors {
            self.director_index
                .entry(director.clone())
                .or_default()
                .push(movie.id.clone());
        }
        self.title_index
            .entry(movie.title.clone())
            .or_default()
            .push(movie.id.clone());
        self.movies.insert(movie.id.clone(), movie);
    }

    /// Insert a rating (overwriting any earlier rating of the same movie by
    /// the same user); the user is registered implicitly
    pub fn insert_rating(&mut self, rating: Rating) {
        self.users.insert(rating.user_id.clone());
        self.movie_ratings
            .entry(rating.movie_id.clone())
            .or_default()
            .insert(rating.user_id.clone(), rating.rating);
        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .insert(rating.movie_id, rating.rating);
    }

    /// Merge the undirected edge between two existing users and set its score.
    ///
    /// Returns false, without touching anything, when either user is unknown
    /// or both endpoints are the same user.
    pub fn upsert_similarity(&mut self, pair: UserPair, score: f64) -> bool {
        if pair.is_self_pair() || !self.users.contains(pair.low()) || !self.users.contains(pair.high())
        {
            return false;
        }
        self.neighbours
            .entry(pair.low().to_string())
            .or_default()
            .insert(pair.high().to_string());
        self.neighbours
            .entry(pair.high().to_string())
            .or_default()
            .insert(pair.low().to_string());
        self.similarities.insert(pair, score);
        true
    }

    /// Counts for debugging/validation: (users, movies, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|r| r.len()).sum();
        (self.users.len(), self.movies.len(), total_ratings)
    }

    /// Check that every rating points at a known movie and lies in [1, 5]
    pub fn validate(&self) -> Result<()> {
        for ratings in self.user_ratings.values() {
            for (movie_id, &score) in ratings {
                if !self.movies.contains_key(movie_id) {
                    return Err(DataLoadError::MissingReference {
                        entity: "Movie".to_string(),
                        id: movie_id.clone(),
                    });
                }
                if !Rating::is_valid_score(score) {
                    return Err(DataLoadError::InvalidValue {
                        field: "rating".to_string(),
                        value: score.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn unindex_movie(&mut self, movie: &Movie) {
        let remove = |index: &mut HashMap<String, Vec<MovieId>>, key: &str| {
            if let Some(ids) = index.get_mut(key) {
                ids.retain(|id| id != &movie.id);
                if ids.is_empty() {
                    index.remove(key);
                }
            }
        };
        for genre in &movie.genres {
            remove(&mut self.genre_index, genre);
        }
        for director in &movie.directors {
            remove(&mut self.director_index, director);
        }
        remove(&mut self.title_index, &movie.title);
    }
}
