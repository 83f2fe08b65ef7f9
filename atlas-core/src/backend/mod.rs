//! Capability traits for the pluggable storage tiers (G–K). Each trait is
//! implemented once per concrete backend in the app crate, plus an
//! in-memory/null test double; the coordinator holds each as
//! `Arc<dyn Trait>` and never depends on a concrete implementation.

use crate::filter::Filter;
use crate::model::{Chunk, CollectionConfig, CollectionInfo, CollectionStats, QntmKey, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A single vector slot populated on a point, keyed by [`crate::model::VectorName`].
pub type NamedVectors = BTreeMap<String, Vec<f32>>;

/// One point to upsert into the vector backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    pub id: String,
    pub vectors: NamedVectors,
    pub payload: serde_json::Value,
}

/// Parameters for a vector similarity search.
#[derive(Debug, Clone)]
pub struct VectorSearchParams {
    pub vector_name: String,
    pub vector: Vec<f32>,
    pub limit: usize,
    pub filter: Filter,
    pub score_threshold: Option<f32>,
    pub with_payload: bool,
    pub with_vector: bool,
}

/// One hit from a vector or full-text search, before hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Option<serde_json::Value>,
    pub vector: Option<NamedVectors>,
}

#[derive(Debug, Clone, Default)]
pub struct ScrollParams {
    pub limit: usize,
    pub offset: Option<String>,
    pub filter: Filter,
}

#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub points: Vec<Point>,
    pub next_offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadIndexSchema {
    Keyword,
    Integer,
    Float,
    Bool,
    Datetime,
}

/// Capability `CanStoreVectors` (§4.G).
#[async_trait]
pub trait VectorBackend: Send + Sync {
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> anyhow::Result<()>;
    async fn search(&self, collection: &str, params: VectorSearchParams) -> anyhow::Result<Vec<SearchHit>>;
    /// Subset of `ids` that exist; missing IDs are silently dropped.
    async fn retrieve(&self, collection: &str, ids: &[String]) -> anyhow::Result<Vec<Point>>;
    async fn delete(&self, collection: &str, ids: &[String]) -> anyhow::Result<()>;
    async fn scroll(&self, collection: &str, params: ScrollParams) -> anyhow::Result<ScrollPage>;
    /// Merge `partial_payload` into each point's existing payload; never replaces it wholesale.
    async fn set_payload(
        &self,
        collection: &str,
        ids: &[String],
        partial_payload: serde_json::Value,
    ) -> anyhow::Result<()>;
    async fn exists(&self, collection: &str) -> anyhow::Result<bool>;
    async fn create(&self, collection: &str, config: CollectionConfig) -> anyhow::Result<()>;
    async fn delete_collection(&self, collection: &str) -> anyhow::Result<()>;
    async fn get_info(&self, collection: &str) -> anyhow::Result<CollectionInfo>;
    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadIndexSchema,
    ) -> anyhow::Result<()>;
    /// Temporarily disable HNSW indexing for bulk load, and rebuild it after.
    async fn set_indexing_enabled(&self, collection: &str, enabled: bool) -> anyhow::Result<()>;
    async fn health(&self) -> bool;
}

/// Relational store (§4.H).
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    async fn upsert_source(&self, source: &Source) -> anyhow::Result<()>;
    async fn get_source_by_path(&self, path: &str) -> anyhow::Result<Option<Source>>;
    async fn upsert_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<()>;
    async fn get_chunk_by_id(&self, id: &str) -> anyhow::Result<Option<Chunk>>;
    /// All chunks currently recorded for a source, used by the orchestrator
    /// to compute a reingest delta against freshly-produced chunk texts.
    async fn get_chunks_by_source(&self, source_id: &str) -> anyhow::Result<Vec<Chunk>>;
    async fn get_all_qntm_keys(&self) -> anyhow::Result<Vec<QntmKey>>;
    /// Records usage of `keys` against `chunk_id`, transactionally alongside
    /// the owning chunk's `payload.qntm_keys` write.
    async fn record_qntm_keys(&self, chunk_id: &str, keys: &[String]) -> anyhow::Result<()>;
    async fn get_collection_stats(&self, collection: &str) -> anyhow::Result<CollectionStats>;
    async fn health_check(&self) -> bool;
}

/// Read-through cache keyed by chunk id, plus derived QNTM-key-set and
/// collection-stats caches (§4.I). `invalidate_*` is authoritative and wins
/// over any unexpired TTL entry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_chunk(&self, id: &str) -> anyhow::Result<Option<Chunk>>;
    async fn set_chunk(&self, chunk: &Chunk) -> anyhow::Result<()>;
    async fn invalidate_chunk(&self, id: &str) -> anyhow::Result<()>;

    async fn get_qntm_keys(&self) -> anyhow::Result<Option<Vec<QntmKey>>>;
    async fn set_qntm_keys(&self, keys: &[QntmKey]) -> anyhow::Result<()>;
    async fn invalidate_qntm_keys(&self) -> anyhow::Result<()>;

    async fn get_stats(&self, collection: &str) -> anyhow::Result<Option<CollectionStats>>;
    async fn set_stats(&self, stats: &CollectionStats) -> anyhow::Result<()>;
    async fn invalidate_stats(&self, collection: &str) -> anyhow::Result<()>;

    async fn health(&self) -> bool;
}

/// One document as the full-text index sees it (§4.J).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTextDocument {
    pub id: String,
    pub original_text: String,
    pub file_path: String,
    pub file_name: String,
    pub qntm_keys: Vec<String>,
    pub file_type: Option<String>,
    pub consolidation_level: Option<i32>,
    pub content_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FullTextSearchParams {
    pub query: String,
    pub limit: usize,
    /// Opaque filter string produced by `translate::to_fulltext_filter`.
    pub filter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTextHit {
    pub id: String,
    pub original_text: String,
    pub file_path: String,
    pub score: f32,
}

#[async_trait]
pub trait FullTextBackend: Send + Sync {
    async fn index(&self, documents: &[FullTextDocument]) -> anyhow::Result<()>;
    async fn search(&self, params: FullTextSearchParams) -> anyhow::Result<Vec<FullTextHit>>;
    async fn health(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub granularity: Option<Granularity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelinePoint {
    pub timestamp: DateTime<Utc>,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Csv,
    Json,
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub output_dir: String,
    pub format: ExportFormat,
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub files: Vec<String>,
    pub row_count: u64,
    pub duration_ms: u64,
}

/// Append-only analytics sink (§4.K). Must never block ingestion: callers
/// treat failures here as non-fatal.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn record_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<()>;
    async fn query_timeline(&self, query: TimelineQuery) -> anyhow::Result<Vec<TimelinePoint>>;
    async fn export(&self, request: ExportRequest) -> anyhow::Result<ExportResult>;
    async fn health(&self) -> bool;
}

/// Rolled-up health across every initialised tier (§4.L).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub tiers: HashMap<String, bool>,
}
