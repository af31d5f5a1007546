//! Cypher statements run by `Neo4jGraphStore`.
//!
//! Schema:
//! - `(:User {id})-[:RATED {score}]->(:Movie {id, title, year, duration})`
//! - `(:Movie)-[:IN_GENRE]->(:Genre {name})`
//! - `(:Director {name})-[:DIRECTED]->(:Movie)`
//! - `(:User)-[:SIMILAR {score}]-(:User)`, one edge per unordered pair
//!
//! Thresholds are passed as parameters so both backends share the constants in
//! `types`. `$user_id` is the empty string when no user is known.

use crate::types::CriterionKind;

pub const HEALTH_CHECK: &str = "RETURN 1 AS health";

pub const ALL_GENRES: &str = r#"
    MATCH (g:Genre)
    RETURN g.name AS name
    ORDER BY name
"#;

pub const ALL_DIRECTORS: &str = r#"
    MATCH (d:Director)
    RETURN d.name AS name
    ORDER BY name
"#;

pub const MOVIES_BY_TITLES: &str = r#"
    MATCH (m:Movie)
    WHERE m.title IN $titles
    RETURN m.id AS id, m.title AS title
    ORDER BY title, id
"#;

pub const MOVIES_BY_TITLE_FRAGMENTS: &str = r#"
    MATCH (m:Movie)
    WHERE any(fragment IN $fragments
              WHERE toLower(m.title) CONTAINS fragment
                 OR fragment CONTAINS toLower(m.title))
    RETURN m.id AS id, m.title AS title
    ORDER BY title, id
    LIMIT $limit
"#;

const GENRE_CANDIDATES: &str = r#"
    MATCH (m:Movie)-[:IN_GENRE]->(g:Genre)
    WHERE g.name IN $values
      AND NOT EXISTS { MATCH (:User {id: $user_id})-[:RATED]->(m) }
    WITH m, count(DISTINCT g) AS matches
    MATCH (m)<-[r:RATED]-(:User)
    WITH m, matches, avg(r.score) AS avg_rating, count(r) AS rating_count
    WHERE rating_count > $min_raters
    RETURN m.id AS movie_id, m.title AS title, toFloat(matches) AS matches,
           avg_rating, rating_count
    ORDER BY matches DESC, avg_rating DESC, title
    LIMIT $limit
"#;

const DIRECTOR_CANDIDATES: &str = r#"
    MATCH (d:Director)-[:DIRECTED]->(m:Movie)
    WHERE d.name IN $values
      AND NOT EXISTS { MATCH (:User {id: $user_id})-[:RATED]->(m) }
    WITH m, count(DISTINCT d) AS matches
    MATCH (m)<-[r:RATED]-(:User)
    WITH m, matches, avg(r.score) AS avg_rating, count(r) AS rating_count
    WHERE rating_count > $min_raters
    RETURN m.id AS movie_id, m.title AS title, toFloat(matches) AS matches,
           avg_rating, rating_count
    ORDER BY matches DESC, avg_rating DESC, title
    LIMIT $limit
"#;

const SIMILAR_ITEM_CANDIDATES: &str = r#"
    MATCH (origin:Movie)-[:IN_GENRE]->(g:Genre)<-[:IN_GENRE]-(m:Movie)
    WHERE origin.id IN $values
      AND NOT m.id IN $values
      AND NOT EXISTS { MATCH (:User {id: $user_id})-[:RATED]->(m) }
    WITH m, count(DISTINCT g) AS matches
    MATCH (m)<-[r:RATED]-(:User)
    WITH m, matches, avg(r.score) AS avg_rating, count(r) AS rating_count
    WHERE rating_count > $min_raters
    RETURN m.id AS movie_id, m.title AS title, toFloat(matches) AS matches,
           avg_rating, rating_count
    ORDER BY matches DESC, avg_rating DESC, title
    LIMIT $limit
"#;

// SIMILAR is matched without direction: an edge is stored once per pair.
const SIMILAR_USER_CANDIDATES: &str = r#"
    MATCH (u:User {id: $user_id})-[s:SIMILAR]-(peer:User)
    WHERE s.score > $min_similarity
    MATCH (peer)-[r:RATED]->(m:Movie)
    WHERE r.score > $min_peer_rating
      AND NOT EXISTS { MATCH (u)-[:RATED]->(m) }
    WITH m, count(DISTINCT peer) AS matches, avg(r.score) AS avg_rating
    MATCH (m)<-[seen:RATED]-(:User)
    WITH m, matches, avg_rating, count(seen) AS rating_count
    WHERE rating_count > $min_raters
    RETURN m.id AS movie_id, m.title AS title, toFloat(matches) AS matches,
           avg_rating, rating_count
    ORDER BY matches DESC, avg_rating DESC, title
    LIMIT $limit
"#;

/// An empty list disables its criterion.
pub const COMBINED_CANDIDATES: &str = r#"
    MATCH (m:Movie)
    WHERE (size($genres) = 0
           OR EXISTS { MATCH (m)-[:IN_GENRE]->(g:Genre) WHERE g.name IN $genres })
      AND (size($directors) = 0
           OR EXISTS { MATCH (d:Director)-[:DIRECTED]->(m) WHERE d.name IN $directors })
      AND (size($similar_items) = 0
           OR EXISTS { MATCH (origin:Movie)-[:IN_GENRE]->(:Genre)<-[:IN_GENRE]-(m)
                       WHERE origin.id IN $similar_items })
      AND NOT m.id IN $similar_items
      AND NOT EXISTS { MATCH (:User {id: $user_id})-[:RATED]->(m) }
    MATCH (m)<-[r:RATED]-(:User)
    WITH m, avg(r.score) AS avg_rating, count(r) AS rating_count
    WHERE rating_count > $min_raters
    RETURN m.id AS movie_id, m.title AS title, $active AS matches,
           avg_rating, rating_count
    ORDER BY avg_rating DESC, rating_count DESC, title
    LIMIT $limit
"#;

pub const MOVIE_DETAILS: &str = r#"
    MATCH (m:Movie)
    WHERE m.title IN $titles
    OPTIONAL MATCH (m)-[:IN_GENRE]->(g:Genre)
    WITH m, collect(DISTINCT g.name) AS genres
    OPTIONAL MATCH (d:Director)-[:DIRECTED]->(m)
    WITH m, genres, collect(DISTINCT d.name) AS directors
    OPTIONAL MATCH (m)<-[r:RATED]-(:User)
    WITH m, genres, directors, avg(r.score) AS avg_rating, count(r) AS rating_count
    RETURN m.id AS id, m.title AS title, m.year AS year, m.duration AS duration,
           genres, directors, avg_rating, rating_count
    ORDER BY title, id
"#;

pub const USER_PREFERENCES: &str = r#"
    MATCH (u:User {id: $user_id})
    CALL {
        WITH u
        MATCH (u)-[r:RATED]->(:Movie)-[:IN_GENRE]->(g:Genre)
        WHERE r.score > $favorite_min
        WITH g.name AS name, count(r) AS hits, avg(r.score) AS mean
        ORDER BY hits DESC, mean DESC, name
        LIMIT $top_n
        RETURN collect(name) AS genres
    }
    CALL {
        WITH u
        MATCH (u)-[r:RATED]->(:Movie)<-[:DIRECTED]-(d:Director)
        WHERE r.score > $favorite_min
        WITH d.name AS name, count(r) AS hits, avg(r.score) AS mean
        ORDER BY hits DESC, mean DESC, name
        LIMIT $top_n
        RETURN collect(name) AS directors
    }
    CALL {
        WITH u
        MATCH (u)-[r:RATED]->(m:Movie)
        WHERE r.score > $favorite_movie_min
        WITH m.id AS id, r.score AS score
        ORDER BY score DESC, id
        LIMIT $top_n
        RETURN collect(id) AS movies
    }
    RETURN genres, directors, movies
"#;

/// Parallel lists keep the parameter a plain list of scalars.
pub const UPSERT_SIMILARITIES: &str = r#"
    UNWIND range(0, size($user_a) - 1) AS i
    MATCH (a:User {id: $user_a[i]}), (b:User {id: $user_b[i]})
    MERGE (a)-[s:SIMILAR]-(b)
    SET s.score = $scores[i]
    RETURN count(s) AS merged
"#;

pub fn criterion_statement(kind: CriterionKind) -> &'static str {
    match kind {
        CriterionKind::Genre => GENRE_CANDIDATES,
        CriterionKind::Director => DIRECTOR_CANDIDATES,
        CriterionKind::SimilarItem => SIMILAR_ITEM_CANDIDATES,
        CriterionKind::SimilarUser => SIMILAR_USER_CANDIDATES,
    }
}
