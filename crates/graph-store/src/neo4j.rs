//! Neo4j backend.

use crate::config::Neo4jConfig;
use crate::cypher;
use crate::error::{GraphStoreError, Result};
use crate::store::GraphStore;
use crate::types::*;
use data_loader::SimilarityRecord;
use neo4rs::{query, BoltList, BoltMap, BoltNull, BoltString, BoltType, Graph, Query, Row};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Graph store backed by a Neo4j database.
///
/// `neo4rs::Graph` keeps a connection pool; every call borrows its own
/// connection, so the store can be shared freely across tasks.
#[derive(Clone)]
pub struct Neo4jGraphStore {
    graph: Arc<Graph>,
}

impl Neo4jGraphStore {
    pub async fn connect(config: &Neo4jConfig) -> Result<Self> {
        info!("Connecting to Neo4j at {}", config.uri);
        let graph = Graph::new(&config.uri, &config.user, &config.password)
            .await
            .map_err(|e| GraphStoreError::Connection(e.to_string()))?;
        Ok(Self {
            graph: Arc::new(graph),
        })
    }

    /// Verify the connection with a trivial statement
    pub async fn health_check(&self) -> Result<bool> {
        let rows = self.fetch(query(cypher::HEALTH_CHECK)).await?;
        let health = match rows.first() {
            Some(row) => row.get::<i64>("health").unwrap_or(0),
            None => 0,
        };
        Ok(health == 1)
    }

    /// Run an arbitrary parameterized statement and return its rows as JSON
    /// objects.
    pub async fn execute(
        &self,
        statement: &str,
        params: Map<String, Value>,
    ) -> Result<Vec<Map<String, Value>>> {
        let mut q = query(statement);
        for (key, value) in params {
            q = q.param(&key, json_to_bolt(value));
        }
        self.fetch(q).await?.iter().map(row_to_json).collect()
    }

    async fn fetch(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_names(&self, statement: &str) -> Result<Vec<String>> {
        self.fetch(query(statement))
            .await?
            .iter()
            .map(|row| field::<String>(row, "name"))
            .collect()
    }

    async fn fetch_title_matches(&self, q: Query) -> Result<Vec<TitleMatch>> {
        self.fetch(q)
            .await?
            .iter()
            .map(|row| {
                Ok(TitleMatch {
                    id: field(row, "id")?,
                    title: field(row, "title")?,
                })
            })
            .collect()
    }

    async fn fetch_candidates(&self, q: Query) -> Result<Vec<CandidateRow>> {
        self.fetch(q).await?.iter().map(candidate_from_row).collect()
    }
}

#[async_trait::async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn all_genres(&self) -> Result<Vec<String>> {
        self.fetch_names(cypher::ALL_GENRES).await
    }

    async fn all_directors(&self) -> Result<Vec<String>> {
        self.fetch_names(cypher::ALL_DIRECTORS).await
    }

    async fn movie_ids_by_titles(&self, titles: &[String]) -> Result<Vec<TitleMatch>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_title_matches(query(cypher::MOVIES_BY_TITLES).param("titles", titles.to_vec()))
            .await
    }

    async fn movie_ids_by_title_fragments(
        &self,
        fragments: &[String],
        limit: usize,
    ) -> Result<Vec<TitleMatch>> {
        if fragments.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = fragments.iter().map(|f| f.to_lowercase()).collect();
        self.fetch_title_matches(
            query(cypher::MOVIES_BY_TITLE_FRAGMENTS)
                .param("fragments", lowered)
                .param("limit", limit as i64),
        )
        .await
    }

    #[instrument(skip(self, values), fields(kind = %kind, values = values.len()))]
    async fn criterion_candidates(
        &self,
        kind: CriterionKind,
        values: &[String],
        user: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CandidateRow>> {
        if kind == CriterionKind::SimilarUser && user.is_none() {
            return Ok(Vec::new());
        }
        if kind != CriterionKind::SimilarUser && values.is_empty() {
            return Ok(Vec::new());
        }
        let q = query(cypher::criterion_statement(kind))
            .param("values", values.to_vec())
            .param("user_id", user.unwrap_or_default())
            .param("limit", limit as i64)
            .param("min_raters", MIN_RATERS)
            .param("min_similarity", SIMILAR_USER_MIN_SCORE)
            .param("min_peer_rating", PEER_MIN_RATING);
        let rows = self.fetch_candidates(q).await?;
        debug!("{} candidates", rows.len());
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
        let q = query(cypher::COMBINED_CANDIDATES)
            .param("genres", criteria.genres.clone())
            .param("directors", criteria.directors.clone())
            .param("similar_items", criteria.similar_items.clone())
            .param("active", criteria.active_count() as f64)
            .param("user_id", user.unwrap_or_default())
            .param("limit", limit as i64)
            .param("min_raters", MIN_RATERS);
        self.fetch_candidates(q).await
    }

    async fn movie_details(&self, titles: &[String]) -> Result<Vec<MovieDetails>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(query(cypher::MOVIE_DETAILS).param("titles", titles.to_vec()))
            .await?
            .iter()
            .map(|row| {
                Ok(MovieDetails {
                    id: field(row, "id")?,
                    title: field(row, "title")?,
                    year: field(row, "year")?,
                    duration: field(row, "duration")?,
                    genres: field(row, "genres")?,
                    directors: field(row, "directors")?,
                    avg_rating: field(row, "avg_rating")?,
                    rating_count: field(row, "rating_count")?,
                })
            })
            .collect()
    }

    async fn user_preferences(&self, user: &str) -> Result<Option<UserPreferences>> {
        let q = query(cypher::USER_PREFERENCES)
            .param("user_id", user)
            .param("favorite_min", FAVORITE_MIN_RATING)
            .param("favorite_movie_min", FAVORITE_MOVIE_MIN_RATING)
            .param("top_n", PREFERENCE_TOP_N as i64);
        let rows = self.fetch(q).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        Ok(Some(UserPreferences {
            favorite_genres: field(row, "genres")?,
            favorite_directors: field(row, "directors")?,
            favorite_movies: field(row, "movies")?,
        }))
    }

    async fn upsert_similarities(&self, records: &[SimilarityRecord]) -> Result<u64> {
        let mut user_a = Vec::with_capacity(records.len());
        let mut user_b = Vec::with_capacity(records.len());
        let mut scores = Vec::with_capacity(records.len());
        for record in records.iter().filter(|r| r.user_a != r.user_b) {
            user_a.push(record.user_a.clone());
            user_b.push(record.user_b.clone());
            scores.push(record.similarity);
        }
        if user_a.is_empty() {
            return Ok(0);
        }

        let q = query(cypher::UPSERT_SIMILARITIES)
            .param("user_a", user_a)
            .param("user_b", user_b)
            .param("scores", scores);
        let rows = self.fetch(q).await?;
        let merged = match rows.first() {
            Some(row) => field::<i64>(row, "merged")?,
            None => 0,
        };
        Ok(merged.max(0) as u64)
    }
}

fn field<T>(row: &Row, key: &str) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    row.get::<T>(key)
        .map_err(|e| GraphStoreError::Decode(format!("{}: {}", key, e)))
}

fn candidate_from_row(row: &Row) -> Result<CandidateRow> {
    Ok(CandidateRow {
        movie_id: field(row, "movie_id")?,
        title: field(row, "title")?,
        matches: field(row, "matches")?,
        avg_rating: field(row, "avg_rating")?,
        rating_count: field(row, "rating_count")?,
    })
}

fn row_to_json(row: &Row) -> Result<Map<String, Value>> {
    row.to::<Map<String, Value>>()
        .map_err(|e| GraphStoreError::Decode(e.to_string()))
}

fn json_to_bolt(value: Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BoltType::from(s),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(entries) => {
            let mut map = BoltMap::new();
            for (key, item) in entries {
                map.put(BoltString::from(key), json_to_bolt(item));
            }
            BoltType::Map(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_json_scalars_to_bolt() {
        assert_eq!(json_to_bolt(Value::Null), BoltType::Null(BoltNull));
        assert_eq!(json_to_bolt(json!(true)), BoltType::from(true));
        assert_eq!(json_to_bolt(Value::from(3)), BoltType::from(3_i64));
        assert_eq!(json_to_bolt(json!(2.5)), BoltType::from(2.5_f64));
        assert_eq!(json_to_bolt(Value::from("x")), BoltType::from("x".to_string()));
    }

    #[test]
    fn test_integers_beyond_i64_become_floats() {
        assert_eq!(
            json_to_bolt(json!(u64::MAX)),
            BoltType::from(u64::MAX as f64)
        );
    }

    #[test]
    fn test_json_list_to_bolt() {
        let bolt = json_to_bolt(json!(["a", 1, null]));
        match bolt {
            BoltType::List(list) => {
                assert_eq!(list.len(), 3);
                assert_eq!(list.value[0], BoltType::from("a"));
                assert_eq!(list.value[1], BoltType::from(1_i64));
                assert_eq!(list.value[2], BoltType::Null(BoltNull));
            }
            other => panic!("expected a list, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_json_object_to_bolt() {
        let bolt = json_to_bolt(json!({"ids": ["m1", "m2"], "active": false}));
        let map = match bolt {
            BoltType::Map(map) => map,
            other => panic!("expected a map, got {:?}", other),
        };
        assert_eq!(map.value.len(), 2);
        assert_eq!(
            map.value.get(&BoltString::from("active")),
            Some(&BoltType::from(false))
        );
        match map.value.get(&BoltString::from("ids")) {
            Some(BoltType::List(ids)) => assert_eq!(ids.len(), 2),
            other => panic!("expected a list of ids, got {:?}", other),
        }
    }

    #[test]
    fn test_row_decodes_to_json_object() {
        let fields = BoltList::from(vec![
            BoltType::from("title"),
            BoltType::from("votes"),
            BoltType::from("genres"),
        ]);
        let data = BoltList::from(vec![
            BoltType::from("Heat"),
            BoltType::from(7_i64),
            BoltType::List(BoltList::from(vec![
                BoltType::from("Action"),
                BoltType::from("Crime"),
            ])),
        ]);

        let decoded = row_to_json(&Row::new(fields, data)).unwrap();
        assert_eq!(
            Value::Object(decoded),
            json!({"title": "Heat", "votes": 7, "genres": ["Action", "Crime"]})
        );
    }
}
