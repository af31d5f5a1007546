//! End-to-end tests of the offline similarity pipeline against the in-memory
//! graph store.

use data_loader::{DataIndex, RatingIngestor, SimilarityRecord};
use graph_store::MemoryGraphStore;
use similarity::{
    discover_checkpoints, SimilarityEngine, SimilarityLoader, SimilarityPipeline, SimilarityStager,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn write_shards(dir: &tempfile::TempDir) -> String {
    let shards = dir.path().join("shards");
    fs::create_dir_all(&shards).unwrap();
    fs::write(
        shards.join("ratings_1.csv"),
        "userId,id,rating\n\
         u1,A,5\nu1,B,4\nu1,C,3\n\
         u2,A,4\nu2,B,5\nu2,C,2\n",
    )
    .unwrap();
    fs::write(
        shards.join("ratings_2.csv"),
        "userId,id,rating\n\
         u3,A,1\nu3,B,2\nu3,C,3\n\
         u4,A,5\nu4,B,4\n",
    )
    .unwrap();
    fs::write(shards.join("ratings_3.csv"), "userId,id,rating\nu5,A,not-a-number\n").unwrap();
    shards.join("ratings_*.csv").display().to_string()
}

fn store_with_users(users: &[&str]) -> Arc<MemoryGraphStore> {
    let mut index = DataIndex::new();
    for user in users {
        index.insert_user(*user);
    }
    Arc::new(MemoryGraphStore::new(index))
}

fn fast_loader(store: Arc<MemoryGraphStore>) -> SimilarityLoader {
    SimilarityLoader::new(store).with_retry_delay(Duration::from_millis(1))
}

#[tokio::test]
async fn test_shards_to_edges() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = write_shards(&dir);

    let ingest = RatingIngestor::new().ingest(&pattern).unwrap();
    assert_eq!(ingest.shards_skipped, 1);
    let matrix = ingest.into_matrix();

    let store = store_with_users(&["u1", "u2", "u3", "u4"]);
    let pipeline = SimilarityPipeline::new(
        SimilarityEngine::new().with_chunk_size(2),
        dir.path().join("checkpoints"),
    );

    let (computed, loaded) = pipeline
        .run(matrix, &fast_loader(store.clone()))
        .await
        .unwrap();

    // u4 shares only two movies with anyone
    assert_eq!(computed.similarities, 3);
    assert_eq!(computed.pairs_evaluated, 6);
    assert_eq!(computed.checkpoints.len(), 1);
    assert!(computed.checkpoints[0].starts_with(pipeline.checkpoint_dir()));
    assert_eq!(loaded.edges_upserted, 3);
    assert_eq!(loaded.rows_dropped, 0);

    let index = store.index();
    assert_eq!(index.similarity_count(), 3);
    let u1_u2 = index.get_similarity("u2", "u1").unwrap();
    assert!((u1_u2 - 0.6546536707).abs() < 1e-6);
    assert!((index.get_similarity("u2", "u3").unwrap() + 0.6546536707).abs() < 1e-6);
    assert!(index.get_similarity("u1", "u4").is_none());
}

#[tokio::test]
async fn test_loading_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut stager = SimilarityStager::new(dir.path()).unwrap();
    stager.push(SimilarityRecord::new("a", "b", 0.9)).unwrap();
    stager.push(SimilarityRecord::new("c", "a", -0.4)).unwrap();
    let files = stager.finish().unwrap();

    let store = store_with_users(&["a", "b", "c"]);
    let loader = fast_loader(store.clone());

    let first = loader.load_files(&files).await;
    let snapshot = (
        store.index().similarity_count(),
        store.index().get_similarity("a", "c"),
    );
    let second = loader.load_files(&files).await;

    assert_eq!(first.edges_upserted, 2);
    assert_eq!(second.edges_upserted, 2);
    assert_eq!(snapshot, (2, Some(-0.4)));
    assert_eq!(store.index().similarity_count(), 2);
    assert_eq!(store.index().get_similarity("a", "c"), Some(-0.4));
}

#[tokio::test]
async fn test_unknown_users_create_no_edges() {
    let users: Vec<String> = (0..=1000).map(|i| format!("u{}", i)).collect();
    let user_refs: Vec<&str> = users.iter().map(String::as_str).collect();
    let store = store_with_users(&user_refs);

    let dir = tempfile::tempdir().unwrap();
    let mut stager = SimilarityStager::new(dir.path()).unwrap();
    for i in 0..1000 {
        let (a, b) = match i {
            10 => ("ghost-1".to_string(), "u11".to_string()),
            500 => ("u500".to_string(), "ghost-2".to_string()),
            _ => (format!("u{}", i), format!("u{}", i + 1)),
        };
        stager.push(SimilarityRecord::new(a, b, 0.5)).unwrap();
    }
    let files = stager.finish().unwrap();

    let report = fast_loader(store.clone()).load_files(&files).await;

    assert_eq!(report.rows_read, 1000);
    assert_eq!(report.rows_written, 1000);
    assert_eq!(report.edges_upserted, 998);
    assert_eq!(report.rows_dropped, 0);
    assert_eq!(report.failed_batches, 0);
    assert_eq!(store.index().similarity_count(), 998);
}

#[tokio::test]
async fn test_load_resumes_from_existing_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let pattern = write_shards(&dir);
    let matrix = RatingIngestor::new().ingest(&pattern).unwrap().into_matrix();
    let checkpoints = dir.path().join("checkpoints");

    let first = SimilarityPipeline::new(SimilarityEngine::new(), &checkpoints).with_stage_threshold(1);
    let computed = first.compute(matrix).await.unwrap();
    assert_eq!(computed.checkpoints.len(), 3);
    assert_eq!(discover_checkpoints(&checkpoints).unwrap(), computed.checkpoints);

    // a second process picks the files up without recomputing
    let store = store_with_users(&["u1", "u2", "u3", "u4"]);
    let resumed = SimilarityPipeline::new(SimilarityEngine::new(), &checkpoints);
    let loaded = resumed
        .load_existing(&fast_loader(store.clone()))
        .await
        .unwrap();

    assert_eq!(loaded.files_loaded, 3);
    assert_eq!(store.index().similarity_count(), 3);
}
