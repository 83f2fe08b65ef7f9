//! Storage coordinator (§4.L): the synchronisation discipline across the
//! vector/metadata/cache/full-text/analytics tiers. Presents a single
//! facade and owns each tier as `Arc<dyn Trait>` in a star topology — no
//! backend holds a reference to another or to this coordinator.

use atlas_core::backend::{
    AnalyticsBackend, CacheBackend, FullTextBackend, FullTextSearchParams, HealthReport,
    HealthStatus, MetadataBackend, Point, SearchHit, VectorBackend, VectorSearchParams,
};
use atlas_core::error::{AtlasError, Tier};
use atlas_core::model::{ChunkPayload, CollectionStats, QntmKey, Source, SourceStatus};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::tracker;

pub struct StorageCoordinator {
    vector: Arc<dyn VectorBackend>,
    metadata: Arc<dyn MetadataBackend>,
    cache: Option<Arc<dyn CacheBackend>>,
    fulltext: Option<Arc<dyn FullTextBackend>>,
    analytics: Option<Arc<dyn AnalyticsBackend>>,
}

impl StorageCoordinator {
    pub fn new(
        vector: Arc<dyn VectorBackend>,
        metadata: Arc<dyn MetadataBackend>,
        cache: Option<Arc<dyn CacheBackend>>,
        fulltext: Option<Arc<dyn FullTextBackend>>,
        analytics: Option<Arc<dyn AnalyticsBackend>>,
    ) -> Self {
        Self {
            vector,
            metadata,
            cache,
            fulltext,
            analytics,
        }
    }

    /// Write protocol: vector → metadata (both fatal) → cache-invalidate →
    /// full-text index → analytics (both non-fatal, logged and swallowed).
    pub async fn upsert_vectors(&self, collection: &str, points: Vec<Point>) -> anyhow::Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let (chunks, sources) = derive_chunks_and_sources(&points)?;

        self.vector
            .upsert(collection, points)
            .await
            .map_err(|e| anyhow::anyhow!(AtlasError::BackendUnavailable {
                tier: Tier::Vector,
                message: e.to_string(),
            }))?;

        for source in &sources {
            self.metadata.upsert_source(source).await.map_err(|e| {
                anyhow::anyhow!(AtlasError::BackendUnavailable {
                    tier: Tier::Metadata,
                    message: e.to_string(),
                })
            })?;
        }
        self.metadata.upsert_chunks(&chunks).await.map_err(|e| {
            anyhow::anyhow!(AtlasError::BackendUnavailable {
                tier: Tier::Metadata,
                message: e.to_string(),
            })
        })?;

        for chunk in &chunks {
            if !chunk.payload.qntm_keys.is_empty() {
                if let Err(e) = self
                    .metadata
                    .record_qntm_keys(&chunk.chunk_id, &chunk.payload.qntm_keys)
                    .await
                {
                    warn!("failed to record qntm keys for {}: {e}", chunk.chunk_id);
                }
            }
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_stats(collection).await {
                warn!("cache stats invalidation failed: {e}");
            }
            if let Err(e) = cache.invalidate_qntm_keys().await {
                warn!("cache qntm_keys invalidation failed: {e}");
            }
            for chunk in &chunks {
                if let Err(e) = cache.invalidate_chunk(&chunk.chunk_id).await {
                    warn!("cache invalidation failed for {}: {e}", chunk.chunk_id);
                }
            }
        }

        if let Some(fulltext) = &self.fulltext {
            let documents = chunks.iter().map(chunk_to_fulltext_document).collect::<Vec<_>>();
            if let Err(e) = fulltext.index(&documents).await {
                warn!("full-text indexing failed, continuing: {e}");
            }
        }

        if let Some(analytics) = &self.analytics {
            if let Err(e) = analytics.record_chunks(&chunks).await {
                warn!("analytics recording failed, continuing: {e}");
            }
        }

        info!("upserted {} chunks across {} sources", chunks.len(), sources.len());
        Ok(())
    }

    /// Read protocol: cache → metadata (populating cache on hit) → vector
    /// fallback, via `retrieve`.
    pub async fn get_chunk_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> anyhow::Result<Option<atlas_core::model::Chunk>> {
        if let Some(cache) = &self.cache {
            if let Some(chunk) = cache.get_chunk(id).await? {
                return Ok(Some(chunk));
            }
        }

        if let Some(chunk) = self.metadata.get_chunk_by_id(id).await? {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.set_chunk(&chunk).await {
                    warn!("failed to populate cache for {id}: {e}");
                }
            }
            return Ok(Some(chunk));
        }

        let ids = vec![id.to_string()];
        let points = self.vector.retrieve(collection, &ids).await?;
        Ok(points.into_iter().find(|p| p.id == id).and_then(|p| {
            serde_json::from_value::<ChunkPayload>(p.payload).ok().map(|payload| {
                atlas_core::model::Chunk {
                    chunk_id: p.id,
                    source_id: tracker::source_id_for_path(&payload.file_path),
                    chunk_index: payload.chunk_index,
                    total_chunks: payload.total_chunks,
                    char_count: payload.char_count,
                    embedding_model: payload.embedding_model.clone(),
                    embedding_strategy: payload.embedding_strategy,
                    content_type: payload.content_type,
                    consolidation_level: payload.consolidation_level.unwrap_or(0),
                    superseded_by: None,
                    deletion_eligible: false,
                    access_count: 0,
                    last_accessed_at: None,
                    created_at: payload.created_at,
                    payload,
                }
            })
        }))
    }

    /// Pure pass-through to the vector tier; the caller has already lowered
    /// the filter via `atlas_core::filter::translate::to_vector_filter`.
    pub async fn search_semantic(
        &self,
        collection: &str,
        params: VectorSearchParams,
    ) -> anyhow::Result<Vec<SearchHit>> {
        self.vector.search(collection, params).await
    }

    /// Hits the full-text tier for IDs and scores, then hydrates payloads
    /// via `get_chunk_by_id`. Hits missing from both metadata and vector
    /// tiers are dropped with a warning.
    pub async fn full_text_search(
        &self,
        collection: &str,
        params: FullTextSearchParams,
    ) -> anyhow::Result<Vec<SearchHit>> {
        let Some(fulltext) = &self.fulltext else {
            return Ok(Vec::new());
        };

        let hits = fulltext.search(params).await?;
        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.get_chunk_by_id(collection, &hit.id).await {
                Ok(Some(chunk)) => results.push(SearchHit {
                    id: hit.id,
                    score: hit.score,
                    payload: serde_json::to_value(&chunk.payload).ok(),
                    vector: None,
                }),
                Ok(None) => warn!("full-text hit {} missing from metadata/vector tiers", hit.id),
                Err(e) => warn!("failed to hydrate full-text hit {}: {e}", hit.id),
            }
        }
        Ok(results)
    }

    pub async fn get_all_qntm_keys(&self) -> anyhow::Result<Vec<QntmKey>> {
        if let Some(cache) = &self.cache {
            if let Some(keys) = cache.get_qntm_keys().await? {
                return Ok(keys);
            }
        }
        let keys = self.metadata.get_all_qntm_keys().await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set_qntm_keys(&keys).await {
                warn!("failed to populate qntm_keys cache: {e}");
            }
        }
        Ok(keys)
    }

    pub async fn get_collection_stats(&self, collection: &str) -> anyhow::Result<CollectionStats> {
        if let Some(cache) = &self.cache {
            if let Some(stats) = cache.get_stats(collection).await? {
                return Ok(stats);
            }
        }
        let stats = self.metadata.get_collection_stats(collection).await?;
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set_stats(&stats).await {
                warn!("failed to populate stats cache: {e}");
            }
        }
        Ok(stats)
    }

    /// Concurrent probes against every initialised tier. `unhealthy` iff the
    /// vector tier is unavailable; else `degraded` iff metadata is down or
    /// any optional tier reports down; else `healthy`.
    pub async fn health(&self) -> HealthReport {
        let vector_ok = self.vector.health().await;
        let metadata_ok = self.metadata.health_check().await;
        let cache_ok = match &self.cache {
            Some(c) => c.health().await,
            None => true,
        };
        let fulltext_ok = match &self.fulltext {
            Some(f) => f.health().await,
            None => true,
        };
        let analytics_ok = match &self.analytics {
            Some(a) => a.health().await,
            None => true,
        };

        let mut tiers = HashMap::new();
        tiers.insert("vector".to_string(), vector_ok);
        tiers.insert("metadata".to_string(), metadata_ok);
        tiers.insert("cache".to_string(), cache_ok);
        tiers.insert("fulltext".to_string(), fulltext_ok);
        tiers.insert("analytics".to_string(), analytics_ok);

        let status = if !vector_ok {
            HealthStatus::Unhealthy
        } else if !metadata_ok || !cache_ok || !fulltext_ok || !analytics_ok {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, tiers }
    }

    /// No persistent connections are held open beyond each backend's own
    /// pool; shutdown is a best-effort final health probe so callers can
    /// log the tiers that were reachable at exit.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let report = self.health().await;
        info!("coordinator shutting down, last-known status: {:?}", report.status);
        Ok(())
    }
}

fn chunk_to_fulltext_document(chunk: &atlas_core::model::Chunk) -> atlas_core::backend::FullTextDocument {
    atlas_core::backend::FullTextDocument {
        id: chunk.chunk_id.clone(),
        original_text: chunk.payload.original_text.clone(),
        file_path: chunk.payload.file_path.clone(),
        file_name: chunk.payload.file_name.clone(),
        qntm_keys: chunk.payload.qntm_keys.clone(),
        file_type: Some(chunk.payload.file_type.clone()),
        consolidation_level: chunk.payload.consolidation_level,
        content_type: serde_json::to_value(chunk.content_type)
            .ok()
            .and_then(|v| v.as_str().map(String::from)),
        created_at: Some(chunk.created_at),
    }
}

/// Step 1 of the write protocol: derive one [`Source`] per distinct
/// `file_path` in the batch (content hash over the joined, chunk-index-
/// ordered `original_text` of that path's chunks in this batch; `file_mtime`
/// captured from disk if the file is still readable, else falls back to the
/// earliest chunk's `created_at`), and one [`atlas_core::model::Chunk`] per
/// point.
fn derive_chunks_and_sources(
    points: &[Point],
) -> anyhow::Result<(Vec<atlas_core::model::Chunk>, Vec<Source>)> {
    let mut chunks = Vec::with_capacity(points.len());
    let mut by_path: HashMap<String, Vec<(i64, String, chrono::DateTime<Utc>)>> = HashMap::new();

    for point in points {
        let payload: ChunkPayload = serde_json::from_value(point.payload.clone())
            .map_err(|e| anyhow::anyhow!(AtlasError::ConsistencyViolation(format!(
                "point {} has an unparsable payload: {e}",
                point.id
            ))))?;

        by_path.entry(payload.file_path.clone()).or_default().push((
            payload.chunk_index,
            payload.original_text.clone(),
            payload.created_at,
        ));

        chunks.push(atlas_core::model::Chunk {
            chunk_id: point.id.clone(),
            source_id: tracker::source_id_for_path(&payload.file_path),
            chunk_index: payload.chunk_index,
            total_chunks: payload.total_chunks,
            char_count: payload.char_count,
            embedding_model: payload.embedding_model.clone(),
            embedding_strategy: payload.embedding_strategy,
            content_type: payload.content_type,
            consolidation_level: payload.consolidation_level.unwrap_or(0),
            superseded_by: None,
            deletion_eligible: false,
            access_count: 0,
            last_accessed_at: None,
            created_at: payload.created_at,
            payload,
        });
    }

    let now = Utc::now();
    let mut sources = Vec::with_capacity(by_path.len());
    for (path, mut entries) in by_path {
        entries.sort_by_key(|(idx, _, _)| *idx);
        let content_hash =
            tracker::content_hash_for_chunks(entries.iter().map(|(_, text, _)| text.as_str()));
        let earliest_created_at = entries.iter().map(|(_, _, t)| *t).min().unwrap_or(now);
        let file_mtime = std::fs::metadata(&path)
            .and_then(|m| m.modified())
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or(earliest_created_at);

        sources.push(Source {
            source_id: tracker::source_id_for_path(&path),
            path,
            content_hash,
            file_mtime,
            status: SourceStatus::Active,
            created_at: earliest_created_at,
            updated_at: now,
        });
    }

    Ok((chunks, sources))
}
