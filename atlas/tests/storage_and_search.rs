//! Integration tests for the storage coordinator and search engine, wired
//! through the in-memory/null backend doubles so the full write → read →
//! search path runs without a network dependency.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use atlas::backend::memory::{
    InMemoryMetadataBackend, InMemoryVectorBackend, NullAnalyticsBackend, NullCacheBackend,
    NullFullTextBackend,
};
use atlas::coordinator::StorageCoordinator;
use atlas::embedding::{EmbedderRegistry, FakeEmbedder};
use atlas::search::SearchEngine;
use atlas_core::backend::Point;
use atlas_core::embedding::EmbeddingProvider;
use atlas_core::filter::Filter;
use atlas_core::model::{
    CollectionConfig, ContentType, Distance, EmbeddingStrategy, HnswParams, VectorName,
};
use atlas_core::search::Origin;
use chrono::Utc;

const DIMS: usize = 8;
const COLLECTION: &str = "notes";

fn chunk_payload(path: &str, index: i64, total: i64, text: &str) -> serde_json::Value {
    serde_json::json!({
        "original_text": text,
        "file_path": path,
        "file_name": path,
        "file_type": "text/plain",
        "chunk_index": index,
        "total_chunks": total,
        "char_count": text.len() as i64,
        "qntm_keys": [],
        "created_at": Utc::now(),
        "embedding_model": "fake-text",
        "embedding_strategy": EmbeddingStrategy::Snippet,
        "content_type": ContentType::Text,
        "vectors_present": [VectorName::Text],
        "consolidation_level": null,
        "importance": null,
    })
}

async fn point(id: &str, path: &str, index: i64, total: i64, text: &str, embedder: &FakeEmbedder) -> Point {
    let mut vectors = BTreeMap::new();
    vectors.insert(
        VectorName::Text.as_str().to_string(),
        embedder.embed_batch(&[text.to_string()]).await.unwrap()[0].clone(),
    );
    Point {
        id: id.to_string(),
        vectors,
        payload: chunk_payload(path, index, total, text),
    }
}

async fn bare_coordinator() -> Arc<StorageCoordinator> {
    let vector = Arc::new(InMemoryVectorBackend::new());
    vector
        .create(
            COLLECTION,
            CollectionConfig {
                dimensions: DIMS,
                distance: Distance::Cosine,
                hnsw: HnswParams::default(),
                quantisation: false,
            },
        )
        .await
        .unwrap();
    let metadata = Arc::new(InMemoryMetadataBackend::new());
    Arc::new(StorageCoordinator::new(vector, metadata, None, None, None))
}

async fn full_coordinator() -> Arc<StorageCoordinator> {
    let vector = Arc::new(InMemoryVectorBackend::new());
    vector
        .create(
            COLLECTION,
            CollectionConfig {
                dimensions: DIMS,
                distance: Distance::Cosine,
                hnsw: HnswParams::default(),
                quantisation: false,
            },
        )
        .await
        .unwrap();
    let metadata = Arc::new(InMemoryMetadataBackend::new());
    Arc::new(StorageCoordinator::new(
        vector,
        metadata,
        Some(Arc::new(NullCacheBackend)),
        Some(Arc::new(NullFullTextBackend)),
        Some(Arc::new(NullAnalyticsBackend)),
    ))
}

fn text_embedder() -> FakeEmbedder {
    FakeEmbedder::new("fake-text", DIMS, VectorName::Text, ContentType::Text)
}

fn registry_with_text() -> Arc<EmbedderRegistry> {
    let mut registry = EmbedderRegistry::new();
    registry.register(ContentType::Text, Arc::new(text_embedder()));
    Arc::new(registry)
}

#[tokio::test]
async fn upsert_then_get_chunk_by_id_round_trips() {
    let coordinator = bare_coordinator().await;
    let embedder = text_embedder();
    let points = vec![point("c1", "a.md", 0, 1, "hello world", &embedder).await];

    coordinator.upsert_vectors(COLLECTION, points).await.unwrap();

    let chunk = coordinator.get_chunk_by_id(COLLECTION, "c1").await.unwrap();
    let chunk = chunk.expect("chunk should be retrievable after upsert");
    assert_eq!(chunk.chunk_id, "c1");
    assert_eq!(chunk.payload.file_path, "a.md");
    assert!(chunk.is_search_eligible());
}

#[tokio::test]
async fn get_chunk_by_id_falls_back_to_vector_tier_when_metadata_misses() {
    // Bypass upsert_vectors' metadata write entirely: push straight into the
    // vector tier to exercise the read protocol's third hop.
    let vector = Arc::new(InMemoryVectorBackend::new());
    vector
        .create(
            COLLECTION,
            CollectionConfig {
                dimensions: DIMS,
                distance: Distance::Cosine,
                hnsw: HnswParams::default(),
                quantisation: false,
            },
        )
        .await
        .unwrap();
    let embedder = text_embedder();
    vector
        .upsert(COLLECTION, vec![point("orphan", "b.md", 0, 1, "stray chunk", &embedder).await])
        .await
        .unwrap();
    let metadata = Arc::new(InMemoryMetadataBackend::new());
    let coordinator = StorageCoordinator::new(vector, metadata, None, None, None);

    let chunk = coordinator.get_chunk_by_id(COLLECTION, "orphan").await.unwrap();
    let chunk = chunk.expect("vector-tier fallback should reconstruct the chunk");
    assert_eq!(chunk.payload.file_path, "b.md");
}

#[tokio::test]
async fn empty_batch_upsert_is_a_no_op() {
    let coordinator = bare_coordinator().await;
    coordinator.upsert_vectors(COLLECTION, vec![]).await.unwrap();
    let stats = coordinator.get_collection_stats(COLLECTION).await.unwrap();
    assert_eq!(stats.total_chunks, 0);
}

#[tokio::test]
async fn health_is_healthy_with_only_mandatory_tiers() {
    let coordinator = bare_coordinator().await;
    let report = coordinator.health().await;
    assert_eq!(report.status, atlas_core::backend::HealthStatus::Healthy);
    assert!(report.tiers["vector"]);
    assert!(report.tiers["metadata"]);
}

#[tokio::test]
async fn full_coordinator_with_optional_tiers_reports_healthy() {
    let coordinator = full_coordinator().await;
    let report = coordinator.health().await;
    assert_eq!(report.status, atlas_core::backend::HealthStatus::Healthy);
}

#[tokio::test]
async fn semantic_search_returns_closest_chunk_first() {
    let coordinator = bare_coordinator().await;
    let embedder = text_embedder();
    let points = vec![
        point("c1", "a.md", 0, 1, "rust programming language", &embedder).await,
        point("c2", "b.md", 0, 1, "gardening tips for tomatoes", &embedder).await,
    ];
    coordinator.upsert_vectors(COLLECTION, points).await.unwrap();

    let engine = SearchEngine::new(coordinator, registry_with_text(), COLLECTION, Duration::from_secs(1));
    let results = engine
        .semantic_search("rust programming language", 10, Filter::default(), None)
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert_eq!(results[0].id, "c1");
    assert_eq!(results[0].origin, Origin::Semantic);
}

#[tokio::test]
async fn full_text_search_drops_hits_missing_from_every_tier() {
    // A full-text hit that names an id no tier can hydrate must be dropped,
    // not surfaced with an empty payload.
    struct StubFullText;
    #[async_trait::async_trait]
    impl atlas_core::backend::FullTextBackend for StubFullText {
        async fn index(&self, _documents: &[atlas_core::backend::FullTextDocument]) -> anyhow::Result<()> {
            Ok(())
        }
        async fn search(
            &self,
            _params: atlas_core::backend::FullTextSearchParams,
        ) -> anyhow::Result<Vec<atlas_core::backend::FullTextHit>> {
            Ok(vec![atlas_core::backend::FullTextHit {
                id: "ghost".to_string(),
                original_text: "ghost text".to_string(),
                file_path: "ghost.md".to_string(),
                score: 1.0,
            }])
        }
        async fn health(&self) -> bool {
            true
        }
    }

    let vector = Arc::new(InMemoryVectorBackend::new());
    vector
        .create(
            COLLECTION,
            CollectionConfig {
                dimensions: DIMS,
                distance: Distance::Cosine,
                hnsw: HnswParams::default(),
                quantisation: false,
            },
        )
        .await
        .unwrap();
    let metadata = Arc::new(InMemoryMetadataBackend::new());
    let coordinator = Arc::new(StorageCoordinator::new(
        vector,
        metadata,
        None,
        Some(Arc::new(StubFullText)),
        None,
    ));

    let engine = SearchEngine::new(coordinator, registry_with_text(), COLLECTION, Duration::from_secs(1));
    let results = engine.keyword_search("ghost", 10, Filter::default()).await.unwrap();
    assert!(results.is_empty(), "hit with no hydratable chunk must be dropped, not surfaced");
}

#[tokio::test]
async fn keyword_search_with_no_fulltext_tier_returns_empty() {
    let coordinator = bare_coordinator().await;
    let engine = SearchEngine::new(coordinator, registry_with_text(), COLLECTION, Duration::from_secs(1));
    let results = engine.keyword_search("rust", 10, Filter::default()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn hybrid_search_falls_back_to_semantic_only_when_fulltext_absent() {
    let coordinator = bare_coordinator().await;
    let embedder = text_embedder();
    coordinator
        .upsert_vectors(COLLECTION, vec![point("c1", "a.md", 0, 1, "rust programming", &embedder).await])
        .await
        .unwrap();

    let engine = SearchEngine::new(coordinator, registry_with_text(), COLLECTION, Duration::from_secs(1));
    let results = engine.hybrid_search("rust programming", 10, Filter::default()).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].origin, Origin::Semantic);
}

#[tokio::test]
async fn qntm_keys_are_recorded_and_listed_after_upsert() {
    let coordinator = bare_coordinator().await;
    let embedder = text_embedder();
    let mut payload = chunk_payload("a.md", 0, 1, "rust and tokio");
    payload["qntm_keys"] = serde_json::json!(["rust", "tokio"]);
    let mut vectors = BTreeMap::new();
    vectors.insert(
        VectorName::Text.as_str().to_string(),
        embedder.embed_batch(&["rust and tokio".to_string()]).await.unwrap()[0].clone(),
    );
    coordinator
        .upsert_vectors(COLLECTION, vec![Point { id: "c1".to_string(), vectors, payload }])
        .await
        .unwrap();

    let keys = coordinator.get_all_qntm_keys().await.unwrap();
    let mut names: Vec<_> = keys.iter().map(|k| k.key.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["rust", "tokio"]);
}
