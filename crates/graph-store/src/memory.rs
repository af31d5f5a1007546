//! In-process backend over `DataIndex`.
//!
//! Answers every query with the same thresholds and ordering as the Cypher
//! statements, with `title` and then `id` as final tie-breakers so results are
//! deterministic.

use crate::error::Result;
use crate::store::GraphStore;
use crate::types::*;
use data_loader::{DataIndex, MovieId, SimilarityRecord, UserPair};
use parking_lot::{RwLock, RwLockReadGuard};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Graph store living entirely in memory
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    index: RwLock<DataIndex>,
}

impl MemoryGraphStore {
    pub fn new(index: DataIndex) -> Self {
        Self {
            index: RwLock::new(index),
        }
    }

    /// Build a store from a catalog file and rating shards
    pub fn from_files(catalog: &Path, ratings_pattern: &str) -> data_loader::Result<Self> {
        Ok(Self::new(DataIndex::load_from_files(catalog, ratings_pattern)?))
    }

    /// Read access to the underlying index
    pub fn index(&self) -> RwLockReadGuard<'_, DataIndex> {
        self.index.read()
    }

    fn rank_candidates(
        index: &DataIndex,
        scored: HashMap<&str, (f64, Option<f64>)>,
        user: Option<&str>,
        limit: usize,
    ) -> Vec<CandidateRow> {
        let mut rows: Vec<CandidateRow> = scored
            .into_iter()
            .filter(|(movie_id, _)| !user.is_some_and(|u| index.has_rated(u, movie_id)))
            .filter_map(|(movie_id, (matches, peer_avg))| {
                let movie = index.get_movie(movie_id)?;
                let stats = index.get_movie_stats(movie_id)?;
                if (stats.rating_count as i64) <= MIN_RATERS {
                    return None;
                }
                Some(CandidateRow {
                    movie_id: movie.id.clone(),
                    title: movie.title.clone(),
                    matches,
                    avg_rating: peer_avg.unwrap_or(stats.avg_rating),
                    rating_count: stats.rating_count as i64,
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            b.matches
                .partial_cmp(&a.matches)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.avg_rating.partial_cmp(&a.avg_rating).unwrap_or(Ordering::Equal))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.movie_id.cmp(&b.movie_id))
        });
        rows.truncate(limit);
        rows
    }

    /// movie -> number of distinct `values` it is listed under
    fn count_listed<'a>(
        values: &[String],
        lookup: impl Fn(&str) -> &'a [MovieId],
    ) -> HashMap<&'a str, (f64, Option<f64>)> {
        let distinct: BTreeSet<&String> = values.iter().collect();
        let mut scored: HashMap<&str, (f64, Option<f64>)> = HashMap::new();
        for value in distinct {
            for movie_id in lookup(value.as_str()) {
                scored.entry(movie_id.as_str()).or_insert((0.0, None)).0 += 1.0;
            }
        }
        scored
    }

    /// movie -> number of distinct genres it shares with any reference movie;
    /// reference movies never score themselves or each other
    fn shared_genres<'a>(index: &'a DataIndex, origins: &[String]) -> HashMap<&'a str, (f64, Option<f64>)> {
        let mut genres_by_movie: HashMap<&str, HashSet<&str>> = HashMap::new();
        for origin in origins {
            let Some(origin_movie) = index.get_movie(origin) else {
                continue;
            };
            for genre in &origin_movie.genres {
                for movie_id in index.get_movies_by_genre(genre) {
                    if !origins.contains(movie_id) {
                        genres_by_movie
                            .entry(movie_id.as_str())
                            .or_default()
                            .insert(genre.as_str());
                    }
                }
            }
        }
        genres_by_movie
            .into_iter()
            .map(|(movie_id, genres)| (movie_id, (genres.len() as f64, None)))
            .collect()
    }

    /// movie -> (endorsing peers, mean of their ratings)
    fn peer_endorsements<'a>(index: &'a DataIndex, user: &str) -> HashMap<&'a str, (f64, Option<f64>)> {
        let mut endorsements: HashMap<&str, (HashSet<&str>, f64, usize)> = HashMap::new();
        for (peer, score) in index.similar_users(user) {
            if score <= SIMILAR_USER_MIN_SCORE {
                continue;
            }
            let Some(ratings) = index.get_user_ratings(peer) else {
                continue;
            };
            for (movie_id, &rating) in ratings {
                if (rating as f64) <= PEER_MIN_RATING {
                    continue;
                }
                let entry = endorsements
                    .entry(movie_id.as_str())
                    .or_insert_with(|| (HashSet::new(), 0.0, 0));
                entry.0.insert(peer);
                entry.1 += rating as f64;
                entry.2 += 1;
            }
        }
        endorsements
            .into_iter()
            .map(|(movie_id, (peers, total, n))| {
                (movie_id, (peers.len() as f64, Some(total / n as f64)))
            })
            .collect()
    }

    fn satisfies(index: &DataIndex, movie_id: &str, criteria: &CombinedCriteria) -> bool {
        let Some(movie) = index.get_movie(movie_id) else {
            return false;
        };
        let genre_ok =
            criteria.genres.is_empty() || movie.genres.iter().any(|g| criteria.genres.contains(g));
        let director_ok = criteria.directors.is_empty()
            || movie.directors.iter().any(|d| criteria.directors.contains(d));
        let similar_ok = criteria.similar_items.is_empty()
            || (!criteria.similar_items.iter().any(|id| id == movie_id)
                && criteria.similar_items.iter().any(|origin_id| {
                    index
                        .get_movie(origin_id)
                        .is_some_and(|origin| origin.genres.iter().any(|g| movie.genres.contains(g)))
                }));
        genre_ok && director_ok && similar_ok
    }
}

fn preference_ranking<'a>(
    ratings: &HashMap<MovieId, f32>,
    index: &'a DataIndex,
    labels: impl Fn(&'a data_loader::Movie) -> &'a [String],
) -> Vec<String> {
    let mut tally: HashMap<&str, (usize, f64)> = HashMap::new();
    for (movie_id, &score) in ratings {
        if (score as f64) <= FAVORITE_MIN_RATING {
            continue;
        }
        let Some(movie) = index.get_movie(movie_id) else {
            continue;
        };
        for label in labels(movie) {
            let entry = tally.entry(label.as_str()).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += score as f64;
        }
    }
    let mut ranked: Vec<(&str, usize, f64)> = tally
        .into_iter()
        .map(|(name, (hits, total))| (name, hits, total / hits as f64))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal))
            .then_with(|| a.0.cmp(b.0))
    });
    ranked
        .into_iter()
        .take(PREFERENCE_TOP_N)
        .map(|(name, _, _)| name.to_string())
        .collect()
}

#[async_trait::async_trait]
impl GraphStore for MemoryGraphStore {
    async fn all_genres(&self) -> Result<Vec<String>> {
        Ok(self.index.read().genres())
    }

    async fn all_directors(&self) -> Result<Vec<String>> {
        Ok(self.index.read().directors())
    }

    async fn movie_ids_by_titles(&self, titles: &[String]) -> Result<Vec<TitleMatch>> {
        let index = self.index.read();
        let mut matches: Vec<TitleMatch> = titles
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .flat_map(|title| index.get_movies_by_title(title))
            .filter_map(|id| index.get_movie(id))
            .map(|movie| TitleMatch {
                id: movie.id.clone(),
                title: movie.title.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn movie_ids_by_title_fragments(
        &self,
        fragments: &[String],
        limit: usize,
    ) -> Result<Vec<TitleMatch>> {
        let lowered: Vec<String> = fragments.iter().map(|f| f.to_lowercase()).collect();
        let index = self.index.read();
        let mut matches: Vec<TitleMatch> = index
            .movies()
            .filter(|movie| {
                let title = movie.title.to_lowercase();
                lowered
                    .iter()
                    .any(|fragment| title.contains(fragment.as_str()) || fragment.contains(&title))
            })
            .map(|movie| TitleMatch {
                id: movie.id.clone(),
                title: movie.title.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn criterion_candidates(
        &self,
        kind: CriterionKind,
        values: &[String],
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CandidateRow>> {
        let guard = self.index.read();
        let index: &DataIndex = &guard;
        let scored = match kind {
            CriterionKind::Genre => Self::count_listed(values, |v| index.get_movies_by_genre(v)),
            CriterionKind::Director => {
                Self::count_listed(values, |v| index.get_movies_by_director(v))
            }
            CriterionKind::SimilarItem => Self::shared_genres(index, values),
            CriterionKind::SimilarUser => match user {
                Some(user) => Self::peer_endorsements(index, user),
                None => HashMap::new(),
            },
        };
        let rows = Self::rank_candidates(index, scored, user, limit);
        debug!("{} candidates for {}", rows.len(), kind);
        Ok(rows)
    }

    async fn combined_candidates(
        &self,
        criteria: &CombinedCriteria,
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CandidateRow>> {
        if criteria.is_empty() {
            return Ok(Vec::new());
        }
        let guard = self.index.read();
        let index: &DataIndex = &guard;
        let active = criteria.active_count() as f64;
        let scored: HashMap<&str, (f64, Option<f64>)> = index
            .movies()
            .filter(|movie| Self::satisfies(index, &movie.id, criteria))
            .map(|movie| (movie.id.as_str(), (active, None)))
            .collect();

        let mut rows = Self::rank_candidates(index, scored, user, usize::MAX);
        rows.sort_by(|a, b| {
            b.avg_rating
                .partial_cmp(&a.avg_rating)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.rating_count.cmp(&a.rating_count))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.movie_id.cmp(&b.movie_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn movie_details(&self, titles: &[String]) -> Result<Vec<MovieDetails>> {
        let index = self.index.read();
        let mut details: Vec<MovieDetails> = titles
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .flat_map(|title| index.get_movies_by_title(title))
            .filter_map(|id| index.get_movie(id))
            .map(|movie| {
                let stats = index.get_movie_stats(&movie.id);
                MovieDetails {
                    id: movie.id.clone(),
                    title: movie.title.clone(),
                    year: movie.year.map(i64::from),
                    duration: movie.duration.map(i64::from),
                    genres: movie.genres.clone(),
                    directors: movie.directors.clone(),
                    avg_rating: stats.map(|s| s.avg_rating),
                    rating_count: stats.map(|s| s.rating_count as i64).unwrap_or(0),
                }
            })
            .collect();
        details.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        Ok(details)
    }

    async fn user_preferences(&self, user: &str) -> Result<Option<UserPreferences>> {
        let guard = self.index.read();
        let index: &DataIndex = &guard;
        if !index.contains_user(user) {
            return Ok(None);
        }
        let Some(ratings) = index.get_user_ratings(user) else {
            return Ok(Some(UserPreferences::default()));
        };

        let mut loved: Vec<(&MovieId, f32)> = ratings
            .iter()
            .filter(|(_, score)| (**score as f64) > FAVORITE_MOVIE_MIN_RATING)
            .map(|(id, &score)| (id, score))
            .collect();
        loved.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        Ok(Some(UserPreferences {
            favorite_genres: preference_ranking(ratings, index, |m| m.genres.as_slice()),
            favorite_directors: preference_ranking(ratings, index, |m| m.directors.as_slice()),
            favorite_movies: loved
                .into_iter()
                .take(PREFERENCE_TOP_N)
                .map(|(id, _)| id.clone())
                .collect(),
        }))
    }

    async fn upsert_similarities(&self, records: &[SimilarityRecord]) -> Result<u64> {
        let mut index = self.index.write();
        let merged = records
            .iter()
            .filter(|r| index.upsert_similarity(UserPair::new(r.user_a.as_str(), r.user_b.as_str()), r.similarity))
            .count();
        Ok(merged as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{Movie, Rating};

    fn movie(id: &str, title: &str, genres: &[&str], directors: &[&str]) -> Movie {
        Movie {
            id: id.to_string(),
            title: title.to_string(),
            year: None,
            duration: None,
            genres: genres.iter().map(|g| g.to_string()).collect(),
            directors: directors.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn rate(index: &mut DataIndex, user: &str, movie: &str, score: f32) {
        index.insert_rating(Rating {
            user_id: user.to_string(),
            movie_id: movie.to_string(),
            rating: score,
        });
    }

    fn store_with_raters() -> MemoryGraphStore {
        let mut index = DataIndex::new();
        index.insert_movie(movie("m1", "Heat", &["Action", "Crime"], &["Michael Mann"]));
        index.insert_movie(movie("m2", "Alien", &["Horror"], &["Ridley Scott"]));
        index.insert_movie(movie("m3", "Thief", &["Crime"], &["Michael Mann"]));
        // six raters each: enough to pass the rater floor
        for u in 1..=6 {
            rate(&mut index, &format!("r{}", u), "m1", 4.0);
            rate(&mut index, &format!("r{}", u), "m2", 3.0);
        }
        for u in 1..=5 {
            rate(&mut index, &format!("r{}", u), "m3", 5.0);
        }
        MemoryGraphStore::new(index)
    }

    #[tokio::test]
    async fn test_rater_floor_is_strict() {
        let store = store_with_raters();
        let rows = store
            .criterion_candidates(CriterionKind::Director, &["Michael Mann".to_string()], None, 10)
            .await
            .unwrap();

        // m3 has exactly five raters and is filtered out
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].movie_id, "m1");
        assert_eq!(rows[0].rating_count, 6);
    }

    #[tokio::test]
    async fn test_rated_movies_are_excluded() {
        let store = store_with_raters();
        let genres = vec!["Action".to_string(), "Horror".to_string()];

        let anonymous = store
            .criterion_candidates(CriterionKind::Genre, &genres, None, 10)
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 2);

        let personal = store
            .criterion_candidates(CriterionKind::Genre, &genres, Some("r1"), 10)
            .await
            .unwrap();
        assert!(personal.is_empty());
    }

    #[tokio::test]
    async fn test_title_fragments_match_both_directions() {
        let store = store_with_raters();
        let found = store
            .movie_ids_by_title_fragments(&["HEAT (1995)".to_string(), "lie".to_string()], 3)
            .await
            .unwrap();
        let titles: Vec<&str> = found.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Alien", "Heat"]);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_preferences() {
        let store = store_with_raters();
        assert!(store.user_preferences("ghost").await.unwrap().is_none());

        let prefs = store.user_preferences("r1").await.unwrap().unwrap();
        assert_eq!(prefs.favorite_genres, vec!["Crime"]);
        assert_eq!(prefs.favorite_directors, vec!["Michael Mann"]);
        assert_eq!(prefs.favorite_movies, vec!["m3"]);
    }
}
