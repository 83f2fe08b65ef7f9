//! Core data types shared by the ingestion and retrieval pipeline.
//!
//! These mirror the data model in the system specification: a [`Source`]
//! (one tracked file) owns many [`Chunk`]s, each carrying a [`ChunkPayload`]
//! self-contained enough to render a search result without a join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Lifecycle state of a tracked source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Deleted,
}

/// A file on disk that has been ingested.
///
/// Sources are uniquely identified by `path`; `source_id` is a stable hash
/// of the canonical path, used as the foreign key chunks carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub path: String,
    pub content_hash: String,
    pub file_mtime: DateTime<Utc>,
    pub status: SourceStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The embedding strategy used to produce a chunk's vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStrategy {
    Snippet,
    Contextualised,
    Code,
    Multimodal,
}

/// The kind of content a chunk holds, used to select embedder capability
/// and chunking policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Code,
    Media,
}

/// One of the named vector slots a chunk may populate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorName {
    Text,
    Code,
    Media,
}

impl VectorName {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorName::Text => "text",
            VectorName::Code => "code",
            VectorName::Media => "media",
        }
    }
}

/// A contiguous slice of a source's normalised content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub char_count: i64,
    pub payload: ChunkPayload,
    pub embedding_model: String,
    pub embedding_strategy: EmbeddingStrategy,
    pub content_type: ContentType,
    pub consolidation_level: i32,
    pub superseded_by: Option<String>,
    pub deletion_eligible: bool,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    /// A chunk is eligible for search results iff not marked deletion-eligible.
    ///
    /// Absence of `superseded_by` does **not** exclude a chunk (I4).
    pub fn is_search_eligible(&self) -> bool {
        !self.deletion_eligible
    }
}

/// The self-contained record stored alongside the vector and keyword index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub original_text: String,
    pub file_path: String,
    pub file_name: String,
    pub file_type: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
    pub char_count: i64,
    pub qntm_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub embedding_strategy: EmbeddingStrategy,
    pub content_type: ContentType,
    pub vectors_present: BTreeSet<VectorName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidation_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<f32>,
}

/// A semantic tag extracted from chunk content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QntmKey {
    pub key: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub usage_count: i64,
}

/// Vector distance function, fixed per collection at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    Cosine,
    Dot,
    Euclidean,
}

/// HNSW graph tuning parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HnswParams {
    pub m: u32,
    pub ef_construct: u32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 100,
        }
    }
}

/// Immutable configuration used to create a vector collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub dimensions: usize,
    pub distance: Distance,
    pub hnsw: HnswParams,
    pub quantisation: bool,
}

/// Summary info about an existing collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub points_count: u64,
    pub dimensions: Option<usize>,
    pub segments: Option<u32>,
}

/// Aggregate counters surfaced by `stats(collection)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection_name: String,
    pub total_chunks: i64,
    pub total_files: i64,
    pub total_chars: i64,
    pub last_updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_eligible_excludes_from_search() {
        let mut chunk = sample_chunk();
        assert!(chunk.is_search_eligible());
        chunk.deletion_eligible = true;
        assert!(!chunk.is_search_eligible());
    }

    #[test]
    fn absent_superseded_by_does_not_exclude() {
        let chunk = sample_chunk();
        assert!(chunk.superseded_by.is_none());
        assert!(chunk.is_search_eligible());
    }

    fn sample_chunk() -> Chunk {
        let now = Utc::now();
        Chunk {
            chunk_id: "c1".into(),
            source_id: "s1".into(),
            chunk_index: 0,
            total_chunks: 1,
            char_count: 10,
            payload: ChunkPayload {
                original_text: "hello".into(),
                file_path: "a.md".into(),
                file_name: "a.md".into(),
                file_type: "text/markdown".into(),
                chunk_index: 0,
                total_chunks: 1,
                char_count: 10,
                qntm_keys: vec![],
                created_at: now,
                embedding_model: "test".into(),
                embedding_strategy: EmbeddingStrategy::Snippet,
                content_type: ContentType::Text,
                vectors_present: BTreeSet::from([VectorName::Text]),
                consolidation_level: None,
                importance: None,
            },
            embedding_model: "test".into(),
            embedding_strategy: EmbeddingStrategy::Snippet,
            content_type: ContentType::Text,
            consolidation_level: 0,
            superseded_by: None,
            deletion_eligible: false,
            access_count: 0,
            last_accessed_at: None,
            created_at: now,
        }
    }
}
