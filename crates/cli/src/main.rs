use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use data_loader::RatingIngestor;
use graph_store::{GraphStore, MemoryGraphStore, Neo4jConfig, Neo4jGraphStore};
use recommender::{
    AggregatorConfig, DedupKey, QueryOutcome, Recommendation, Recommender,
    RecommenderConfig,
};
use similarity::{ComputeReport, LoadReport, SimilarityEngine, SimilarityLoader, SimilarityPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// ReelGraph - graph-backed movie recommender
#[derive(Parser)]
#[command(name = "reel-graph")]
#[command(about = "Offline user similarity and online movie recommendations over a rating graph", long_about = None)]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the rating graph lives. Neo4j (configured through NEO4J_URI,
/// NEO4J_USER and NEO4J_PASSWORD) unless a local catalog is given.
#[derive(Args)]
struct StoreArgs {
    /// Movie catalog CSV; serves the graph from memory instead of Neo4j
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Rating shards loaded alongside the catalog
    #[arg(long, global = true, default_value = "data/ratings_*.csv")]
    ratings: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Read rating shards and report what they contain
    Ingest {
        /// Reader threads (default: min(cores, 8))
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Compute user similarities into checkpoint files
    Compute {
        /// Directory receiving similarities_batch_N.csv checkpoints
        #[arg(long, default_value = "checkpoints")]
        checkpoints: PathBuf,

        /// Movies two users must share to be compared
        #[arg(long, default_value = "3")]
        min_common: usize,

        /// Users per work unit
        #[arg(long, default_value = "1000")]
        chunk_size: usize,

        /// Scoring threads (default: min(cores + 4, 16))
        #[arg(long)]
        workers: Option<usize>,

        /// Similarities per checkpoint file
        #[arg(long, default_value = "100000")]
        stage_threshold: usize,

        /// Load the checkpoints into the graph store afterwards
        #[arg(long)]
        load: bool,
    },

    /// Load existing checkpoint files into the graph store
    Load {
        #[arg(long, default_value = "checkpoints")]
        checkpoints: PathBuf,

        /// Rows per upsert
        #[arg(long, default_value = "1000")]
        batch_size: usize,

        /// Tries per batch before it is split
        #[arg(long, default_value = "3")]
        max_attempts: u32,
    },

    /// Personalized recommendations for a user
    Recommend {
        #[arg(long)]
        user: String,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Recommendations for a free-text query, e.g. "algo como \"Heat\""
    Ask {
        query: String,

        /// Exclude this user's movies and add what similar users liked
        #[arg(long)]
        user: Option<String>,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// Phrase introducing a reference movie; repeat to give several
        /// (default: como, similar a, parecida a, parecido a)
        #[arg(long = "cue")]
        cues: Vec<String>,

        /// Reference movies kept from partial title matches
        #[arg(long, default_value = "3")]
        fragment_limit: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run a raw Cypher statement against Neo4j and print rows as JSON
    Query {
        statement: String,

        /// Statement parameter as name=<json>, e.g. --param 'ids=["1","2"]'
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// Show a user's preference profile
    User {
        #[arg(long)]
        user: String,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Show the criteria behind each recommendation
    #[arg(long)]
    explain: bool,

    /// Merge candidates by movie id instead of by title
    #[arg(long)]
    by_id: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest { workers } => handle_ingest(&cli.store, workers).await?,
        Commands::Compute {
            checkpoints,
            min_common,
            chunk_size,
            workers,
            stage_threshold,
            load,
        } => {
            let mut engine = SimilarityEngine::new()
                .with_min_common(min_common)
                .with_chunk_size(chunk_size);
            if let Some(workers) = workers {
                engine = engine.with_workers(workers);
            }
            handle_compute(&cli.store, engine, checkpoints, stage_threshold, load).await?
        }
        Commands::Load {
            checkpoints,
            batch_size,
            max_attempts,
        } => handle_load(&cli.store, checkpoints, batch_size, max_attempts).await?,
        Commands::Recommend {
            user,
            limit,
            output,
        } => handle_recommend(&cli.store, &user, limit, &output).await?,
        Commands::Ask {
            query,
            user,
            limit,
            cues,
            fragment_limit,
            output,
        } => {
            let config = recommender_config(&output)
                .with_cues(cues)
                .with_fragment_limit(fragment_limit);
            handle_ask(&cli.store, config, &query, user.as_deref(), limit, &output).await?
        }
        Commands::Query { statement, params } => handle_query(&cli.store, &statement, params).await?,
        Commands::User { user } => handle_user(&cli.store, &user).await?,
    }

    Ok(())
}

/// Open the configured graph store
async fn open_store(args: &StoreArgs) -> Result<Arc<dyn GraphStore>> {
    let start = Instant::now();
    match &args.catalog {
        Some(catalog) => {
            println!("Loading catalog {} and ratings {}...", catalog.display(), args.ratings);
            let catalog = catalog.clone();
            let ratings = args.ratings.clone();
            let store = tokio::task::spawn_blocking(move || {
                MemoryGraphStore::from_files(&catalog, &ratings)
            })
            .await
            .context("Loading task failed")?
            .context("Failed to load the local catalog")?;
            info!("Serving the rating graph from memory");
            println!("{} Loaded local graph in {:.2?}", "✓".green(), start.elapsed());
            Ok(Arc::new(store))
        }
        None => {
            let config = Neo4jConfig::from_env().context("Invalid Neo4j configuration")?;
            println!("Connecting to Neo4j at {}...", config.uri);
            let store = Neo4jGraphStore::connect(&config)
                .await
                .context("Failed to connect to Neo4j")?;
            if !store.health_check().await? {
                bail!("Neo4j at {} did not answer the health check", config.uri);
            }
            println!("{} Connected in {:.2?}", "✓".green(), start.elapsed());
            Ok(Arc::new(store))
        }
    }
}

fn recommender_config(output: &OutputArgs) -> RecommenderConfig {
    let dedup = if output.by_id {
        DedupKey::MovieId
    } else {
        DedupKey::Title
    };
    RecommenderConfig::default().with_aggregator(AggregatorConfig::default().with_dedup(dedup))
}

async fn open_recommender(args: &StoreArgs, config: RecommenderConfig) -> Result<Recommender> {
    let store = open_store(args).await?;
    Recommender::with_config(store, config)
}

/// Parse a `name=<json>` statement parameter; a value that is not JSON is
/// taken as a plain string
fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", raw))?;
    if name.is_empty() {
        return Err(format!("missing parameter name in '{}'", raw));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

/// Handle the 'ingest' command
async fn handle_ingest(args: &StoreArgs, workers: Option<usize>) -> Result<()> {
    let mut ingestor = RatingIngestor::new();
    if let Some(workers) = workers {
        ingestor = ingestor.with_workers(workers);
    }
    let pattern = args.ratings.clone();
    let start = Instant::now();
    let report = tokio::task::spawn_blocking(move || ingestor.ingest(&pattern))
        .await
        .context("Ingest task failed")??;
    let elapsed = start.elapsed();

    let rating_count = report.ratings.len();
    let (shards_read, shards_skipped, rows_dropped) =
        (report.shards_read, report.shards_skipped, report.rows_dropped);
    let matrix = report.into_matrix();

    println!("{}", "Ingest summary:".bold().blue());
    println!("{}Shards read: {}", "• ".green(), shards_read);
    println!("{}Shards skipped: {}", "• ".green(), shards_skipped);
    println!("{}Ratings: {}", "• ".cyan(), rating_count);
    println!("{}Rows dropped (score out of range): {}", "• ".cyan(), rows_dropped);
    println!("{}Users: {}", "• ".cyan(), matrix.user_count());
    println!("{}Elapsed: {:.2?}", "• ".cyan(), elapsed);
    Ok(())
}

/// Handle the 'compute' command
async fn handle_compute(
    args: &StoreArgs,
    engine: SimilarityEngine,
    checkpoints: PathBuf,
    stage_threshold: usize,
    load: bool,
) -> Result<()> {
    let pattern = args.ratings.clone();
    let matrix = tokio::task::spawn_blocking(move || RatingIngestor::new().ingest(&pattern))
        .await
        .context("Ingest task failed")??
        .into_matrix();
    println!(
        "{} Read {} ratings from {} users",
        "✓".green(),
        matrix.rating_count(),
        matrix.user_count()
    );

    let pipeline =
        SimilarityPipeline::new(engine, checkpoints).with_stage_threshold(stage_threshold);
    println!("Staging checkpoints in {}...", pipeline.checkpoint_dir().display());
    if !load {
        let computed = pipeline.compute(matrix).await?;
        print_compute_report(&computed);
        return Ok(());
    }

    let loader = SimilarityLoader::new(open_store(args).await?);
    let (computed, loaded) = pipeline.run(matrix, &loader).await?;
    print_compute_report(&computed);
    print_load_report(&loaded);
    Ok(())
}

/// Handle the 'load' command
async fn handle_load(
    args: &StoreArgs,
    checkpoints: PathBuf,
    batch_size: usize,
    max_attempts: u32,
) -> Result<()> {
    let store = open_store(args).await?;
    let loader = SimilarityLoader::new(store)
        .with_batch_size(batch_size)
        .with_max_attempts(max_attempts)
        .with_retry_delay(Duration::from_secs(1));
    let pipeline = SimilarityPipeline::new(SimilarityEngine::new(), checkpoints);
    let loaded = pipeline.load_existing(&loader).await?;
    print_load_report(&loaded);
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    args: &StoreArgs,
    user: &str,
    limit: usize,
    output: &OutputArgs,
) -> Result<()> {
    let recommender = open_recommender(args, recommender_config(output)).await?;
    let start = Instant::now();
    let results = recommender.personalized(user, limit).await?;
    print_recommendations(&results, output, start.elapsed())
}

/// Handle the 'ask' command
async fn handle_ask(
    args: &StoreArgs,
    config: RecommenderConfig,
    query: &str,
    user: Option<&str>,
    limit: usize,
    output: &OutputArgs,
) -> Result<()> {
    let recommender = open_recommender(args, config).await?;
    let start = Instant::now();
    match recommender.process_query(query, user, limit).await? {
        QueryOutcome::NoCriteria => {
            println!(
                "{}",
                "No genre, director or movie found in the query. Try naming one, e.g. 'algo como \"Heat\"'."
                    .yellow()
            );
            Ok(())
        }
        QueryOutcome::Recommendations(results) => {
            print_recommendations(&results, output, start.elapsed())
        }
    }
}

/// Handle the 'query' command
async fn handle_query(
    args: &StoreArgs,
    statement: &str,
    params: Vec<(String, serde_json::Value)>,
) -> Result<()> {
    if args.catalog.is_some() {
        bail!("Raw queries need Neo4j; drop --catalog");
    }
    let config = Neo4jConfig::from_env().context("Invalid Neo4j configuration")?;
    let store = Neo4jGraphStore::connect(&config)
        .await
        .context("Failed to connect to Neo4j")?;

    let start = Instant::now();
    let rows = store
        .execute(statement, params.into_iter().collect())
        .await
        .context("Query failed")?;
    for row in &rows {
        println!("{}", serde_json::to_string(row)?);
    }
    println!("{}", format!("{} rows in {:.2?}", rows.len(), start.elapsed()).dimmed());
    Ok(())
}

/// Handle the 'user' command
async fn handle_user(args: &StoreArgs, user: &str) -> Result<()> {
    let recommender = open_recommender(args, RecommenderConfig::default()).await?;
    let preferences = recommender.preferences(user).await?;

    println!("{}", format!("User {}", user).bold().blue());
    if preferences.is_empty() {
        println!("  No strong preferences yet");
        return Ok(());
    }
    println!("{}Favorite genres: {}", "• ".green(), preferences.favorite_genres.join(", "));
    println!(
        "{}Favorite directors: {}",
        "• ".green(),
        preferences.favorite_directors.join(", ")
    );
    println!("{}Favorite movies: {}", "• ".green(), preferences.favorite_movies.join(", "));
    Ok(())
}

fn print_compute_report(report: &ComputeReport) {
    println!("{}", "Similarity computation:".bold().blue());
    println!("{}Users: {}", "• ".green(), report.users);
    println!("{}Pairs evaluated: {}", "• ".green(), report.pairs_evaluated);
    println!("{}Similarities: {}", "• ".green(), report.similarities);
    println!("{}Checkpoints: {}", "• ".green(), report.checkpoints.len());
}

fn print_load_report(report: &LoadReport) {
    println!("{}", "Similarity load:".bold().blue());
    println!(
        "{}Files loaded: {} (skipped {})",
        "• ".green(),
        report.files_loaded,
        report.files_skipped
    );
    println!(
        "{}Rows read: {} (corrupt {})",
        "• ".green(),
        report.rows_read,
        report.rows_corrupt
    );
    println!("{}Rows written: {}", "• ".green(), report.rows_written);
    println!("{}Edges upserted: {}", "• ".green(), report.edges_upserted);
    if report.rows_dropped > 0 {
        println!(
            "{}",
            format!(
                "• Rows dropped: {} in {} failed batches",
                report.rows_dropped, report.failed_batches
            )
            .red()
        );
    }
}

fn print_recommendations(
    results: &[Recommendation],
    output: &OutputArgs,
    elapsed: Duration,
) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("{}", "No movies matched.".yellow());
        return Ok(());
    }

    println!("{}", "Movie Recommendations:".bold().blue());
    for (rank, rec) in results.iter().enumerate() {
        let movie = &rec.movie;
        let year = movie
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "????".to_string());
        println!(
            "{}. {} ({}) [{}] - Score: {:.3}",
            (rank + 1).to_string().green(),
            movie.title.bold(),
            year,
            movie.genres.join(", "),
            rec.score
        );
        if output.explain {
            let criteria: Vec<&str> = rec.criteria.iter().map(|c| c.as_str()).collect();
            let rating = movie
                .avg_rating
                .map(|r| format!("{:.2}", r))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   Matched: {} | Directors: {} | Avg rating: {} ({} ratings)",
                criteria.join(", "),
                movie.directors.join(", "),
                rating,
                movie.rating_count
            );
        }
    }
    println!("{}", format!("{} results in {:.2?}", results.len(), elapsed).dimmed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_param_reads_json_values() {
        assert_eq!(
            parse_param(r#"ids=["1","2"]"#).unwrap(),
            ("ids".to_string(), json!(["1", "2"]))
        );
        assert_eq!(parse_param("limit=5").unwrap().1, json!(5));
    }

    #[test]
    fn test_parse_param_falls_back_to_string() {
        assert_eq!(parse_param("name=Heat").unwrap().1, json!("Heat"));
    }

    #[test]
    fn test_parse_param_needs_a_name() {
        assert!(parse_param("Heat").is_err());
        assert!(parse_param("=5").is_err());
    }
}
