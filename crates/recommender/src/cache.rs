//! In-process caches for preference profiles and personalized results.
//!
//! Every layer lives in one `CacheStore` behind a single mutex, so clearing
//! is atomic across layers. The lock only guards map operations; callers
//! compute outside it and commit afterwards, which can recompute the same
//! entry twice under a race but never blocks on the graph store.

use crate::aggregator::{Recommendation, RecommendationAggregator};
use anyhow::Result;
use data_loader::UserId;
use graph_store::UserPreferences;
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Shared handle to a ranked result list
pub type SharedRecommendations = Arc<Vec<Recommendation>>;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime of preference and recommendation entries (default: 1 hour)
    pub ttl: Duration,
    /// Capacity of the preference memo (default: 100)
    pub memo_capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            memo_capacity: NonZeroUsize::new(100).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Zero is treated as one
    pub fn with_memo_capacity(mut self, capacity: usize) -> Self {
        self.memo_capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        self
    }
}

#[derive(Debug)]
struct Stamped<T> {
    value: T,
    stored_at: Instant,
}

impl<T: Clone> Stamped<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<T> {
        (self.stored_at.elapsed() < ttl).then(|| self.value.clone())
    }
}

/// Fresh value under `key`; a stale entry is evicted on the way out
fn lookup<K, T>(map: &mut HashMap<K, Stamped<T>>, key: &K, ttl: Duration) -> Option<T>
where
    K: std::hash::Hash + Eq,
    T: Clone,
{
    let found = map.get(key)?.fresh(ttl);
    if found.is_none() {
        map.remove(key);
    }
    found
}

struct Layers {
    /// Most recently used profiles, no expiry
    memo: LruCache<UserId, UserPreferences>,
    preferences: HashMap<UserId, Stamped<UserPreferences>>,
    recommendations: HashMap<(UserId, usize), Stamped<SharedRecommendations>>,
}

/// Every in-process cache, guarded by one lock
pub struct CacheStore {
    layers: Mutex<Layers>,
    config: CacheConfig,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            layers: Mutex::new(Layers {
                memo: LruCache::new(config.memo_capacity),
                preferences: HashMap::new(),
                recommendations: HashMap::new(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cached profile: the memo first, then the TTL layer
    pub fn preferences(&self, user: &str) -> Option<UserPreferences> {
        let mut layers = self.layers.lock();
        if let Some(found) = layers.memo.get(user) {
            return Some(found.clone());
        }
        let found = lookup(&mut layers.preferences, &user.to_string(), self.config.ttl)?;
        layers.memo.put(user.to_string(), found.clone());
        Some(found)
    }

    pub fn store_preferences(&self, user: &str, preferences: UserPreferences) {
        let mut layers = self.layers.lock();
        layers.memo.put(user.to_string(), preferences.clone());
        layers
            .preferences
            .insert(user.to_string(), Stamped::new(preferences));
    }

    /// Cached result list for `(user, limit)` if still within the TTL
    pub fn recommendations(&self, user: &str, limit: usize) -> Option<SharedRecommendations> {
        let mut layers = self.layers.lock();
        lookup(
            &mut layers.recommendations,
            &(user.to_string(), limit),
            self.config.ttl,
        )
    }

    pub fn store_recommendations(&self, user: &str, limit: usize, results: SharedRecommendations) {
        self.layers
            .lock()
            .recommendations
            .insert((user.to_string(), limit), Stamped::new(results));
    }

    /// Drop every entry of every layer in one critical section
    pub fn clear(&self) {
        let mut layers = self.layers.lock();
        layers.memo.clear();
        layers.preferences.clear();
        layers.recommendations.clear();
    }

    /// (profiles, result lists) currently held
    pub fn entry_counts(&self) -> (usize, usize) {
        let layers = self.layers.lock();
        (layers.preferences.len(), layers.recommendations.len())
    }
}

/// TTL cache in front of the personalized recommendation path
pub struct RecommendationCache {
    store: Arc<CacheStore>,
    aggregator: Arc<RecommendationAggregator>,
}

impl RecommendationCache {
    pub fn new(store: Arc<CacheStore>, aggregator: Arc<RecommendationAggregator>) -> Self {
        Self { store, aggregator }
    }

    /// Personalized results for `user`, served from cache within the TTL.
    ///
    /// A hit returns the very `Arc` stored on the miss that computed it.
    /// Empty results are never cached.
    #[instrument(skip(self))]
    pub async fn personalized(&self, user: &str, limit: usize) -> Result<SharedRecommendations> {
        if let Some(hit) = self.store.recommendations(user, limit) {
            debug!("Cache hit for {} (limit {})", user, limit);
            return Ok(hit);
        }

        let results = Arc::new(self.aggregator.personalized(user, limit).await?);
        if !results.is_empty() {
            self.store
                .store_recommendations(user, limit, Arc::clone(&results));
        }
        Ok(results)
    }

    pub fn clear(&self) {
        self.store.clear();
        info!("Recommendation and preference caches cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(genre: &str) -> UserPreferences {
        UserPreferences {
            favorite_genres: vec![genre.to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_preferences_round_trip_and_clear() {
        let cache = CacheStore::default();
        assert!(cache.preferences("alice").is_none());

        cache.store_preferences("alice", prefs("Drama"));
        assert_eq!(cache.preferences("alice"), Some(prefs("Drama")));

        cache.store_recommendations("alice", 10, Arc::new(Vec::new()));
        assert_eq!(cache.entry_counts(), (1, 1));

        cache.clear();
        assert_eq!(cache.entry_counts(), (0, 0));
        assert!(cache.preferences("alice").is_none());
        assert!(cache.recommendations("alice", 10).is_none());
    }

    #[test]
    fn test_memo_outlives_ttl() {
        let cache = CacheStore::new(CacheConfig::default().with_ttl(Duration::ZERO));
        cache.store_preferences("alice", prefs("Drama"));

        assert!(cache.recommendations("alice", 5).is_none());
        assert_eq!(cache.preferences("alice"), Some(prefs("Drama")));
    }

    #[test]
    fn test_expired_profile_without_memo_is_a_miss() {
        let cache = CacheStore::new(
            CacheConfig::default()
                .with_ttl(Duration::ZERO)
                .with_memo_capacity(1),
        );
        cache.store_preferences("alice", prefs("Drama"));
        // evicts alice from the memo
        cache.store_preferences("bob", prefs("Comedy"));

        assert!(cache.preferences("alice").is_none());
    }

    #[test]
    fn test_stale_entries_are_evicted_on_lookup() {
        let cache = CacheStore::new(
            CacheConfig::default()
                .with_ttl(Duration::ZERO)
                .with_memo_capacity(1),
        );
        cache.store_preferences("alice", prefs("Drama"));
        cache.store_preferences("bob", prefs("Comedy"));
        cache.store_recommendations("alice", 5, Arc::new(Vec::new()));
        assert_eq!(cache.entry_counts(), (2, 1));

        assert!(cache.recommendations("alice", 5).is_none());
        assert!(cache.preferences("alice").is_none());
        // the entry for bob was never looked up
        assert_eq!(cache.entry_counts(), (1, 0));
    }

    #[test]
    fn test_recommendations_keyed_by_limit() {
        let cache = CacheStore::default();
        let results: SharedRecommendations = Arc::new(Vec::new());
        cache.store_recommendations("alice", 10, results.clone());

        let hit = cache.recommendations("alice", 10).unwrap();
        assert!(Arc::ptr_eq(&hit, &results));
        assert!(cache.recommendations("alice", 5).is_none());
    }
}
