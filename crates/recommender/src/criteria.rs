//! Turning free text into recommendation criteria.
//!
//! Genres come from the localized lexicon, falling back to catalog genre
//! names only when the lexicon finds nothing. Directors are catalog names
//! found in the text. Reference movies follow a cue phrase ("como",
//! "similar a", ...) either quoted or as a single word, and are resolved to
//! movie ids through the graph store.

use crate::lexicon::GenreLexicon;
use anyhow::{Context, Result};
use data_loader::MovieId;
use graph_store::{CombinedCriteria, CriterionKind, GraphStore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Phrases that introduce a reference movie
pub const DEFAULT_CUES: &[&str] = &["como", "similar a", "parecida a", "parecido a"];

/// Cap on movies resolved by partial title match
pub const DEFAULT_FRAGMENT_LIMIT: usize = 3;

/// What a query asks for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Criteria {
    pub genres: Vec<String>,
    pub directors: Vec<String>,
    /// Reference movie ids
    pub similar_items: Vec<MovieId>,
    /// Also recommend what similar users liked (needs a user)
    pub similar_user: bool,
}

impl Criteria {
    /// Non-empty criteria among genres, directors and reference movies, in
    /// that order
    pub fn structural(&self) -> Vec<(CriterionKind, &[String])> {
        [
            (CriterionKind::Genre, self.genres.as_slice()),
            (CriterionKind::Director, self.directors.as_slice()),
            (CriterionKind::SimilarItem, self.similar_items.as_slice()),
        ]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect()
    }

    pub fn structural_count(&self) -> usize {
        self.structural().len()
    }

    pub fn is_empty(&self) -> bool {
        self.structural_count() == 0 && !self.similar_user
    }

    pub fn to_combined(&self) -> CombinedCriteria {
        CombinedCriteria {
            genres: self.genres.clone(),
            directors: self.directors.clone(),
            similar_items: self.similar_items.clone(),
        }
    }
}

/// Extracts `Criteria` from natural-language queries
pub struct CriteriaPlanner {
    store: Arc<dyn GraphStore>,
    lexicon: GenreLexicon,
    cue_pattern: Regex,
    fragment_limit: usize,
}

impl CriteriaPlanner {
    pub fn new(store: Arc<dyn GraphStore>) -> Result<Self> {
        Ok(Self {
            store,
            lexicon: GenreLexicon::default(),
            cue_pattern: cue_pattern(DEFAULT_CUES)?,
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
        })
    }

    pub fn with_lexicon(mut self, lexicon: GenreLexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// Replace the phrases that introduce a reference movie
    pub fn with_cues<S: AsRef<str>>(mut self, cues: &[S]) -> Result<Self> {
        self.cue_pattern = cue_pattern(cues)?;
        Ok(self)
    }

    /// Configure the cap on partial title matches (default: 3)
    pub fn with_fragment_limit(mut self, limit: usize) -> Self {
        self.fragment_limit = limit;
        self
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn extract(&self, text: &str) -> Result<Criteria> {
        let lowered = text.to_lowercase();

        let mut genres = self.lexicon.genres_in(text);
        if genres.is_empty() {
            let catalog = self
                .store
                .all_genres()
                .await
                .context("Failed to list genres")?;
            genres = names_in(catalog, &lowered);
        }

        let catalog = self
            .store
            .all_directors()
            .await
            .context("Failed to list directors")?;
        let directors = names_in(catalog, &lowered);

        let titles = self.referenced_titles(text);
        let similar_items = if titles.is_empty() {
            Vec::new()
        } else {
            self.resolve_titles(&titles).await?
        };

        let criteria = Criteria {
            genres,
            directors,
            similar_items,
            similar_user: false,
        };
        debug!(?criteria, "Extracted criteria");
        Ok(criteria)
    }

    /// Titles following a cue phrase, in order of appearance
    pub fn referenced_titles(&self, text: &str) -> Vec<String> {
        let mut titles: Vec<String> = Vec::new();
        for caps in self.cue_pattern.captures_iter(text) {
            let Some(title) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
                continue;
            };
            let title = title.as_str().trim().to_string();
            if !title.is_empty() && !titles.contains(&title) {
                titles.push(title);
            }
        }
        titles
    }

    /// Exact title lookup, then partial matching only if nothing matched
    async fn resolve_titles(&self, titles: &[String]) -> Result<Vec<MovieId>> {
        let mut matches = self
            .store
            .movie_ids_by_titles(titles)
            .await
            .context("Failed to look up titles")?;
        if matches.is_empty() {
            matches = self
                .store
                .movie_ids_by_title_fragments(titles, self.fragment_limit)
                .await
                .context("Failed to look up partial titles")?;
        }

        let mut ids: Vec<MovieId> = Vec::with_capacity(matches.len());
        for found in matches {
            if !ids.contains(&found.id) {
                ids.push(found.id);
            }
        }
        debug!("Resolved {:?} to {} movies", titles, ids.len());
        Ok(ids)
    }
}

/// Catalog names contained in the lowercased text
fn names_in(catalog: Vec<String>, lowered: &str) -> Vec<String> {
    catalog
        .into_iter()
        .filter(|name| !name.trim().is_empty() && lowered.contains(&name.to_lowercase()))
        .collect()
}

/// `cue "quoted title"`, `cue 'quoted title'` or `cue word`
fn cue_pattern<S: AsRef<str>>(cues: &[S]) -> Result<Regex> {
    let alternatives: Vec<String> = cues
        .iter()
        .map(|cue| {
            cue.as_ref()
                .split_whitespace()
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(r"\s+")
        })
        .filter(|cue| !cue.is_empty())
        .collect();
    let pattern = format!(
        r#"(?i)\b(?:{})\s+(?:"([^"]+)"|'([^']+)'|(\w+))"#,
        alternatives.join("|")
    );
    Regex::new(&pattern).with_context(|| format!("Invalid cue pattern {}", pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{DataIndex, Movie};
    use graph_store::MemoryGraphStore;

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

    fn planner() -> CriteriaPlanner {
        let mut index = DataIndex::new();
        index.insert_movie(movie("m1", "Heat", &["Action", "Crime"], &["Michael Mann"]));
        index.insert_movie(movie("m2", "The Matrix", &["Action", "Science Fiction"], &["Lana Wachowski"]));
        index.insert_movie(movie("m3", "Matrix Reloaded", &["Action"], &["Lana Wachowski"]));
        index.insert_movie(movie("m4", "Matrix Revolutions", &["Action"], &["Lana Wachowski"]));
        index.insert_movie(movie("m5", "Matrix Resurrections", &["Action"], &["Lana Wachowski"]));
        index.insert_movie(movie("m6", "Se7en", &["Thriller"], &["David Fincher"]));
        CriteriaPlanner::new(Arc::new(MemoryGraphStore::new(index))).unwrap()
    }

    #[tokio::test]
    async fn test_genre_and_director() {
        let criteria = planner()
            .extract("Quiero algo de acción de michael mann")
            .await
            .unwrap();
        assert_eq!(criteria.genres, vec!["Action"]);
        assert_eq!(criteria.directors, vec!["Michael Mann"]);
        assert!(criteria.similar_items.is_empty());
        assert_eq!(criteria.structural_count(), 2);
    }

    #[tokio::test]
    async fn test_lexicon_wins_over_catalog_genres() {
        let criteria = planner().extract("acción o Thriller").await.unwrap();
        assert_eq!(criteria.genres, vec!["Action"]);
    }

    #[tokio::test]
    async fn test_catalog_genres_when_lexicon_is_silent() {
        let criteria = planner().extract("un buen thriller").await.unwrap();
        assert_eq!(criteria.genres, vec!["Thriller"]);
    }

    #[tokio::test]
    async fn test_quoted_title_resolves_exactly() {
        let criteria = planner().extract(r#"algo como "Heat""#).await.unwrap();
        assert_eq!(criteria.similar_items, vec!["m1"]);
    }

    #[tokio::test]
    async fn test_single_word_title_falls_back_to_fragments() {
        let criteria = planner().extract("algo parecido a matrix").await.unwrap();
        // four titles contain "matrix"; only three are kept
        assert_eq!(criteria.similar_items, vec!["m3", "m5", "m4"]);
    }

    #[tokio::test]
    async fn test_fragment_limit_caps_partial_matches() {
        let criteria = planner()
            .with_fragment_limit(1)
            .extract("algo parecido a matrix")
            .await
            .unwrap();
        assert_eq!(criteria.similar_items, vec!["m3"]);
    }

    #[tokio::test]
    async fn test_custom_cues_replace_defaults() {
        let planner = planner().with_cues(&["like"]).unwrap();
        let criteria = planner.extract(r#"something like "Heat""#).await.unwrap();
        assert_eq!(criteria.similar_items, vec!["m1"]);
        assert!(planner.referenced_titles("algo como Heat").is_empty());
    }

    #[tokio::test]
    async fn test_no_criteria() {
        let criteria = planner().extract("hola, ¿qué tal?").await.unwrap();
        assert!(criteria.is_empty());
    }

    #[test]
    fn test_referenced_titles() {
        let planner = planner();
        assert_eq!(
            planner.referenced_titles("similar a 'El Padrino' o como Alien, como Alien"),
            vec!["El Padrino", "Alien"]
        );
        assert!(planner.referenced_titles("comodín").is_empty());
    }
}
