//! # Recommendation Aggregator
//!
//! Blends the per-criterion candidate lists of the graph store into one
//! ranked, hydrated result list.
//!
//! ## Planning
//! - more than one structural criterion (genres, directors, reference
//!   movies): a single intersection query, plus similar users when asked for
//! - otherwise: one concurrent task per criterion, similar users added
//!   automatically whenever a user is known
//!
//! ## Scoring
//! Each candidate row contributes `(raw * 0.7 + avg_rating * 0.3) * weight`
//! to its movie, where `raw` is the row's match count (three points per
//! satisfied criterion for intersection rows). Contributions for the same
//! movie add up.

use crate::criteria::Criteria;
use crate::preferences::PreferenceProfiler;
use anyhow::{Context, Result};
use graph_store::{CandidateRow, CriterionKind, GraphStore, MovieDetails};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Share of a contribution driven by the match count
const MATCH_SHARE: f64 = 0.7;
/// Share of a contribution driven by the average rating
const RATING_SHARE: f64 = 0.3;
/// Raw score per criterion satisfied by an intersection row
const COMBINED_MATCH_SCORE: f64 = 3.0;

/// How candidates from different criteria are recognized as the same movie
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupKey {
    /// Movies sharing a title are merged, and every movie carrying that
    /// title is returned on hydration
    #[default]
    Title,
    MovieId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionWeights {
    pub genre: f64,
    pub director: f64,
    pub similar_item: f64,
    pub similar_user: f64,
    /// Intersection rows
    pub combined: f64,
}

impl Default for CriterionWeights {
    fn default() -> Self {
        Self {
            genre: 0.30,
            director: 0.25,
            similar_item: 0.25,
            similar_user: 0.20,
            combined: 0.50,
        }
    }
}

impl CriterionWeights {
    pub fn of(&self, kind: CriterionKind) -> f64 {
        match kind {
            CriterionKind::Genre => self.genre,
            CriterionKind::Director => self.director,
            CriterionKind::SimilarItem => self.similar_item,
            CriterionKind::SimilarUser => self.similar_user,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub weights: CriterionWeights,
    /// Candidate queries in flight at once (default: 4)
    pub max_concurrency: usize,
    /// Candidates requested per criterion on the personalized path (default: 5)
    pub personalized_limit: usize,
    pub dedup: DedupKey,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            weights: CriterionWeights::default(),
            max_concurrency: 4,
            personalized_limit: 5,
            dedup: DedupKey::Title,
        }
    }
}

impl AggregatorConfig {
    pub fn with_weights(mut self, weights: CriterionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_personalized_limit(mut self, limit: usize) -> Self {
        self.personalized_limit = limit;
        self
    }

    pub fn with_dedup(mut self, dedup: DedupKey) -> Self {
        self.dedup = dedup;
        self
    }
}

/// A hydrated movie with its blended score and the criteria that found it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub movie: MovieDetails,
    pub score: f64,
    pub criteria: Vec<CriterionKind>,
}

/// Where a batch of candidate rows came from
#[derive(Debug, Clone)]
enum Signal {
    Single(CriterionKind),
    /// Intersection over these criteria
    Combined(Vec<CriterionKind>),
}

#[derive(Debug)]
struct Batch {
    signal: Signal,
    rows: Vec<CandidateRow>,
}

/// One movie (or title) accumulating contributions
#[derive(Debug)]
struct Group {
    movie_id: String,
    title: String,
    score: f64,
    criteria: Vec<CriterionKind>,
}

pub struct RecommendationAggregator {
    store: Arc<dyn GraphStore>,
    profiler: Arc<PreferenceProfiler>,
    config: AggregatorConfig,
}

impl RecommendationAggregator {
    pub fn new(store: Arc<dyn GraphStore>, profiler: Arc<PreferenceProfiler>) -> Self {
        Self {
            store,
            profiler,
            config: AggregatorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Recommendations for explicit criteria, excluding anything `user` rated
    #[instrument(skip(self, criteria), fields(structural = criteria.structural_count()))]
    pub async fn recommend_by_criteria(
        &self,
        criteria: &Criteria,
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Recommendation>> {
        let start = Instant::now();
        let structural = criteria.structural();

        let batches = if structural.len() > 1 {
            let kinds: Vec<CriterionKind> = structural.iter().map(|(kind, _)| *kind).collect();
            self.combined(criteria, kinds, user, limit).await
        } else {
            let mut tasks: Vec<(CriterionKind, Vec<String>)> = structural
                .into_iter()
                .map(|(kind, values)| (kind, values.to_vec()))
                .collect();
            if let Some(user) = user {
                tasks.push((CriterionKind::SimilarUser, vec![user.to_string()]));
            }
            self.fan_out(tasks, user, limit).await
        };

        let results = self.finish(batches, limit).await?;
        info!(
            "Criteria query produced {} recommendations in {:.2?}",
            results.len(),
            start.elapsed()
        );
        Ok(results)
    }

    /// Recommendations derived from the user's own preference profile
    #[instrument(skip(self))]
    pub async fn personalized(&self, user: &str, limit: usize) -> Result<Vec<Recommendation>> {
        let start = Instant::now();
        let preferences = self.profiler.preferences(user).await?;

        let tasks: Vec<(CriterionKind, Vec<String>)> = [
            (CriterionKind::Genre, preferences.favorite_genres),
            (CriterionKind::Director, preferences.favorite_directors),
            (CriterionKind::SimilarItem, preferences.favorite_movies),
            (CriterionKind::SimilarUser, vec![user.to_string()]),
        ]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .collect();

        let batches = self
            .fan_out(tasks, Some(user), self.config.personalized_limit)
            .await;
        let results = self.finish(batches, limit).await?;
        info!(
            "Personalized query for {} produced {} recommendations in {:.2?}",
            user,
            results.len(),
            start.elapsed()
        );
        Ok(results)
    }

    /// One intersection query, and the similar-user query alongside it when
    /// requested
    async fn combined(
        &self,
        criteria: &Criteria,
        kinds: Vec<CriterionKind>,
        user: Option<&str>,
        limit: usize,
    ) -> Vec<Batch> {
        let combined = criteria.to_combined();
        let peers_wanted = criteria.similar_user && user.is_some();

        let (intersection, peers) = tokio::join!(
            self.store.combined_candidates(&combined, user, limit),
            async {
                if peers_wanted {
                    Some(
                        self.store
                            .criterion_candidates(CriterionKind::SimilarUser, &[], user, limit)
                            .await,
                    )
                } else {
                    None
                }
            }
        );

        let mut batches = Vec::new();
        match intersection {
            Ok(rows) => batches.push(Batch {
                signal: Signal::Combined(kinds),
                rows,
            }),
            Err(e) => warn!("Combined candidates failed: {}", e),
        }
        match peers {
            Some(Ok(rows)) => batches.push(Batch {
                signal: Signal::Single(CriterionKind::SimilarUser),
                rows,
            }),
            Some(Err(e)) => warn!("Similar-user candidates failed: {}", e),
            None => {}
        }
        batches
    }

    /// Run one candidate query per task concurrently. Failed tasks are
    /// logged and left out; the rest come back in dispatch order.
    async fn fan_out(
        &self,
        tasks: Vec<(CriterionKind, Vec<String>)>,
        user: Option<&str>,
        limit: usize,
    ) -> Vec<Batch> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let dispatched: Vec<CriterionKind> = tasks.iter().map(|(kind, _)| *kind).collect();
        let mut set = JoinSet::new();

        for (slot, (kind, values)) in tasks.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let user = user.map(str::to_string);
            set.spawn(async move {
                let rows = async {
                    let _permit = semaphore.acquire_owned().await?;
                    let rows = store
                        .criterion_candidates(kind, &values, user.as_deref(), limit)
                        .await?;
                    anyhow::Ok(rows)
                }
                .await;
                (slot, rows)
            });
        }

        let mut slots: Vec<Option<Vec<CandidateRow>>> = vec![None; dispatched.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((slot, Ok(rows))) => {
                    debug!("{} returned {} candidates", dispatched[slot], rows.len());
                    slots[slot] = Some(rows);
                }
                Ok((slot, Err(e))) => {
                    warn!("{} candidates failed: {:#}", dispatched[slot], e);
                }
                Err(e) => warn!("Candidate task did not complete: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(dispatched)
            .filter_map(|(rows, kind)| {
                rows.map(|rows| Batch {
                    signal: Signal::Single(kind),
                    rows,
                })
            })
            .collect()
    }

    /// Merge, rank, truncate, hydrate
    async fn finish(&self, batches: Vec<Batch>, limit: usize) -> Result<Vec<Recommendation>> {
        let groups = self.merge(batches, limit);
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        let mut titles: Vec<String> = Vec::with_capacity(groups.len());
        for group in &groups {
            if !titles.contains(&group.title) {
                titles.push(group.title.clone());
            }
        }
        let details = self
            .store
            .movie_details(&titles)
            .await
            .context("Failed to load movie details")?;

        Ok(self.hydrate(groups, &details, limit))
    }

    /// Accumulate weighted contributions per movie, best first, at most
    /// `limit` groups. Ties keep encounter order.
    fn merge(&self, batches: Vec<Batch>, limit: usize) -> Vec<Group> {
        let weights = &self.config.weights;
        let mut groups: Vec<Group> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for batch in batches {
            let (weight, kinds, per_match) = match &batch.signal {
                Signal::Single(kind) => (weights.of(*kind), vec![*kind], 1.0),
                Signal::Combined(kinds) => (weights.combined, kinds.clone(), COMBINED_MATCH_SCORE),
            };

            for row in batch.rows {
                let raw = row.matches * per_match;
                let contribution = (raw * MATCH_SHARE + row.avg_rating * RATING_SHARE) * weight;
                let key = match self.config.dedup {
                    DedupKey::Title => row.title.clone(),
                    DedupKey::MovieId => row.movie_id.clone(),
                };

                let position = *positions.entry(key).or_insert_with(|| {
                    groups.push(Group {
                        movie_id: row.movie_id.clone(),
                        title: row.title.clone(),
                        score: 0.0,
                        criteria: Vec::new(),
                    });
                    groups.len() - 1
                });

                let group = &mut groups[position];
                group.score += contribution;
                for kind in &kinds {
                    if !group.criteria.contains(kind) {
                        group.criteria.push(*kind);
                    }
                }
            }
        }

        groups.sort_by(|a, b| b.score.total_cmp(&a.score));
        groups.truncate(limit);
        groups
    }

    /// Attach details to ranked groups, keeping rank order
    fn hydrate(
        &self,
        groups: Vec<Group>,
        details: &[MovieDetails],
        limit: usize,
    ) -> Vec<Recommendation> {
        let mut results: Vec<Recommendation> = Vec::with_capacity(groups.len());
        for group in groups {
            let matching = details.iter().filter(|detail| match self.config.dedup {
                DedupKey::Title => detail.title == group.title,
                DedupKey::MovieId => detail.id == group.movie_id,
            });
            for detail in matching {
                results.push(Recommendation {
                    movie: detail.clone(),
                    score: group.score,
                    criteria: group.criteria.clone(),
                });
            }
        }
        results.truncate(limit);
        results
    }
}
