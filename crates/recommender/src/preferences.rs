use crate::cache::CacheStore;
use anyhow::{Context, Result};
use graph_store::{GraphStore, UserPreferences};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Derives what a user tends to like: favorite genres and directors (top 3
/// by number of movies rated above 4) and up to 3 movies rated above 4.5.
///
/// Profiles are cached in the shared `CacheStore`. An unknown user gets an
/// empty profile.
pub struct PreferenceProfiler {
    store: Arc<dyn GraphStore>,
    cache: Arc<CacheStore>,
}

impl PreferenceProfiler {
    pub fn new(store: Arc<dyn GraphStore>, cache: Arc<CacheStore>) -> Self {
        Self { store, cache }
    }

    #[instrument(skip(self))]
    pub async fn preferences(&self, user: &str) -> Result<UserPreferences> {
        if let Some(cached) = self.cache.preferences(user) {
            return Ok(cached);
        }

        let preferences = self
            .store
            .user_preferences(user)
            .await
            .with_context(|| format!("Failed to load preferences of {}", user))?
            .unwrap_or_default();
        debug!(
            genres = preferences.favorite_genres.len(),
            directors = preferences.favorite_directors.len(),
            movies = preferences.favorite_movies.len(),
            "Computed preference profile"
        );

        self.cache.store_preferences(user, preferences.clone());
        Ok(preferences)
    }
}
