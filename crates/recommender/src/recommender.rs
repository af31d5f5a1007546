use crate::aggregator::{AggregatorConfig, RecommendationAggregator};
use crate::cache::{CacheConfig, CacheStore, RecommendationCache, SharedRecommendations};
use crate::criteria::{Criteria, CriteriaPlanner, DEFAULT_CUES, DEFAULT_FRAGMENT_LIMIT};
use crate::lexicon::GenreLexicon;
use crate::preferences::PreferenceProfiler;
use anyhow::Result;
use graph_store::{GraphStore, UserPreferences};
use std::sync::Arc;
use tracing::{info, instrument};

/// Settings for every component the facade wires together
#[derive(Debug, Clone)]
pub struct RecommenderConfig {
    pub aggregator: AggregatorConfig,
    pub cache: CacheConfig,
    pub lexicon: GenreLexicon,
    /// Phrases that introduce a reference movie in a query
    pub cues: Vec<String>,
    /// Cap on reference movies resolved by partial title match
    pub fragment_limit: usize,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            aggregator: AggregatorConfig::default(),
            cache: CacheConfig::default(),
            lexicon: GenreLexicon::default(),
            cues: DEFAULT_CUES.iter().map(|cue| cue.to_string()).collect(),
            fragment_limit: DEFAULT_FRAGMENT_LIMIT,
        }
    }
}

impl RecommenderConfig {
    pub fn with_aggregator(mut self, aggregator: AggregatorConfig) -> Self {
        self.aggregator = aggregator;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_lexicon(mut self, lexicon: GenreLexicon) -> Self {
        self.lexicon = lexicon;
        self
    }

    /// An empty list keeps the current cues
    pub fn with_cues(mut self, cues: Vec<String>) -> Self {
        if !cues.is_empty() {
            self.cues = cues;
        }
        self
    }

    pub fn with_fragment_limit(mut self, limit: usize) -> Self {
        self.fragment_limit = limit;
        self
    }
}

/// Result of a free-text query
#[derive(Debug, Clone)]
pub enum QueryOutcome {
    /// The text named no genre, director or movie and there was no user to
    /// fall back on
    NoCriteria,
    /// Ranked results, possibly empty when nothing matched
    Recommendations(SharedRecommendations),
}

impl QueryOutcome {
    pub fn recommendations(&self) -> Option<&SharedRecommendations> {
        match self {
            QueryOutcome::NoCriteria => None,
            QueryOutcome::Recommendations(results) => Some(results),
        }
    }
}

/// Query entry point: criteria extraction, aggregation and caching over one
/// graph store
pub struct Recommender {
    planner: CriteriaPlanner,
    profiler: Arc<PreferenceProfiler>,
    aggregator: Arc<RecommendationAggregator>,
    cache: RecommendationCache,
}

impl Recommender {
    pub fn new(store: Arc<dyn GraphStore>) -> Result<Self> {
        Self::with_config(store, RecommenderConfig::default())
    }

    pub fn with_config(store: Arc<dyn GraphStore>, config: RecommenderConfig) -> Result<Self> {
        let caches = Arc::new(CacheStore::new(config.cache));
        let profiler = Arc::new(PreferenceProfiler::new(store.clone(), caches.clone()));
        let aggregator = Arc::new(
            RecommendationAggregator::new(store.clone(), profiler.clone())
                .with_config(config.aggregator),
        );
        let planner = CriteriaPlanner::new(store)?
            .with_lexicon(config.lexicon)
            .with_cues(config.cues.as_slice())?
            .with_fragment_limit(config.fragment_limit);

        Ok(Self {
            planner,
            profiler,
            cache: RecommendationCache::new(caches, aggregator.clone()),
            aggregator,
        })
    }

    /// Answer a free-text query.
    ///
    /// Without criteria a known user gets cached personalized results; with
    /// criteria the query is never cached.
    #[instrument(skip(self, text))]
    pub async fn process_query(
        &self,
        text: &str,
        user: Option<&str>,
        limit: usize,
    ) -> Result<QueryOutcome> {
        let criteria = self.planner.extract(text).await?;
        if criteria.is_empty() {
            return match user {
                Some(user) => {
                    info!("No criteria in query, falling back to personalized results");
                    Ok(QueryOutcome::Recommendations(
                        self.cache.personalized(user, limit).await?,
                    ))
                }
                None => Ok(QueryOutcome::NoCriteria),
            };
        }
        let results = self.recommend(&criteria, user, limit).await?;
        Ok(QueryOutcome::Recommendations(results))
    }

    /// Uncached recommendations for explicit criteria
    pub async fn recommend(
        &self,
        criteria: &Criteria,
        user: Option<&str>,
        limit: usize,
    ) -> Result<SharedRecommendations> {
        Ok(Arc::new(
            self.aggregator
                .recommend_by_criteria(criteria, user, limit)
                .await?,
        ))
    }

    /// Cached personalized recommendations
    pub async fn personalized(&self, user: &str, limit: usize) -> Result<SharedRecommendations> {
        self.cache.personalized(user, limit).await
    }

    pub async fn preferences(&self, user: &str) -> Result<UserPreferences> {
        self.profiler.preferences(user).await
    }

    pub async fn extract_criteria(&self, text: &str) -> Result<Criteria> {
        self.planner.extract(text).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
