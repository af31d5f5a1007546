//! CSV parsers for rating shards and the movie catalog.
//!
//! - rating shards: `userId,id,rating` (extra columns are ignored, `movieId`
//!   is accepted in place of `id`)
//! - movie catalog: `id,title,year,duration,genres,directors`, where genres
//!   and directors are pipe-separated: "Drama|Crime"

use crate::error::{DataLoadError, Result};
use crate::types::*;
use serde::Deserialize;
use std::path::Path;

/// Raw row of a rating shard
#[derive(Debug, Deserialize)]
struct RatingRow {
    #[serde(rename = "userId")]
    user_id: String,
    #[serde(rename = "id", alias = "movieId")]
    movie_id: String,
    rating: f32,
}

/// Raw row of the movie catalog
#[derive(Debug, Deserialize)]
struct MovieRow {
    id: String,
    title: String,
    #[serde(default)]
    year: Option<u16>,
    #[serde(default)]
    duration: Option<u32>,
    #[serde(default)]
    genres: String,
    #[serde(default)]
    directors: String,
}

/// Ratings read from one shard
#[derive(Debug, Default)]
pub struct ShardRatings {
    pub ratings: Vec<Rating>,
    /// Rows that decoded but carried a score outside [1, 5]
    pub dropped: usize,
}

/// Parse one rating shard.
///
/// Any undecodable row fails the whole shard; the ingestor treats that as a
/// malformed shard and skips it. Rows whose score is out of range are dropped
/// one by one.
pub fn parse_rating_shard(path: &Path) -> Result<ShardRatings> {
    let file = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataLoadError::from_csv(&file, e))?;

    let mut shard = ShardRatings::default();
    for row in reader.deserialize::<RatingRow>() {
        let row = row.map_err(|e| DataLoadError::from_csv(&file, e))?;
        if !Rating::is_valid_score(row.rating) {
            shard.dropped += 1;
            continue;
        }
        shard.ratings.push(Rating {
            user_id: row.user_id,
            movie_id: row.movie_id,
            rating: row.rating,
        });
    }
    Ok(shard)
}

/// Parse the movie catalog file
pub fn parse_movies(path: &Path) -> Result<Vec<Movie>> {
    let file = path.display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| DataLoadError::from_csv(&file, e))?;

    let mut movies = Vec::new();
    for row in reader.deserialize::<MovieRow>() {
        let row = row.map_err(|e| DataLoadError::from_csv(&file, e))?;
        if row.id.is_empty() {
            return Err(DataLoadError::InvalidValue {
                field: "id".to_string(),
                value: row.title,
            });
        }
        let year = row.year.or_else(|| extract_year_from_title(&row.title));
        movies.push(Movie {
            id: row.id,
            title: row.title,
            year,
            duration: row.duration,
            genres: split_list(&row.genres),
            directors: split_list(&row.directors),
        });
    }
    Ok(movies)
}

/// Extract year from movie title
///
/// Example: "Toy Story (1995)" -> Some(1995)
///          "Movie Title" -> None
fn extract_year_from_title(title: &str) -> Option<u16> {
    let start = title.rfind('(')?;
    let end = title.rfind(')')?;
    if start < end {
        let year_str = &title[start + 1..end];
        if let Ok(year) = year_str.parse::<u16>() {
            return Some(year);
        }
    }
    None
}

/// Split a pipe-separated list, dropping blanks
///
/// Example: "Action| Adventure||Sci-Fi" -> ["Action", "Adventure", "Sci-Fi"]
fn split_list(s: &str) -> Vec<String> {
    s.split('|')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year_from_title("Toy Story (1995)"), Some(1995));
        assert_eq!(extract_year_from_title("Movie Title"), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list("Action| Adventure||Sci-Fi"),
            vec!["Action", "Adventure", "Sci-Fi"]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_parse_rating_shard() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "ratings_part_1.csv",
            "userId,id,rating,timestamp\n1,tt01,4.5,100\n2,tt01,0.5,101\n2,tt02,3,102\n",
        );

        let shard = parse_rating_shard(&path).unwrap();
        assert_eq!(shard.ratings.len(), 2);
        assert_eq!(shard.dropped, 1);
        assert_eq!(shard.ratings[0].user_id, "1");
        assert_eq!(shard.ratings[1].movie_id, "tt02");
    }

    #[test]
    fn test_parse_rating_shard_accepts_movie_id_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "r.csv", "userId,movieId,rating\n9,42,5\n");

        let shard = parse_rating_shard(&path).unwrap();
        assert_eq!(shard.ratings[0].movie_id, "42");
    }

    #[test]
    fn test_malformed_shard_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "bad.csv", "userId,id,rating\n1,tt01,great\n");

        let err = parse_rating_shard(&path).unwrap_err();
        assert!(matches!(err, DataLoadError::ParseError { .. }));
    }

    #[test]
    fn test_missing_shard_is_file_not_found() {
        let err = parse_rating_shard(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, DataLoadError::FileNotFound { .. }));
    }

    #[test]
    fn test_parse_movies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "movies.csv",
            "id,title,year,duration,genres,directors\n\
             tt01,Heat (1995),,170,Action|Crime|Drama,Michael Mann\n\
             tt02,Alien,1979,117,Horror|Sci-Fi,Ridley Scott\n",
        );

        let movies = parse_movies(&path).unwrap();
        assert_eq!(movies.len(), 2);
        assert_eq!(movies[0].year, Some(1995));
        assert_eq!(movies[0].genres, vec!["Action", "Crime", "Drama"]);
        assert_eq!(movies[1].directors, vec!["Ridley Scott"]);
        assert_eq!(movies[1].duration, Some(117));
    }
}
