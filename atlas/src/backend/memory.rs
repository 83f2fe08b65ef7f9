//! In-memory / no-op test doubles for each backend trait, grounded on the
//! teacher's `InMemoryStore` test double: enough behaviour to exercise the
//! coordinator and search engine in integration tests without a network
//! dependency.

use atlas_core::backend::{
    AnalyticsBackend, CacheBackend, ExportRequest, ExportResult, FullTextBackend,
    FullTextDocument, FullTextHit, FullTextSearchParams, MetadataBackend, PayloadIndexSchema,
    Point, ScrollPage, ScrollParams, SearchHit, TimelinePoint, TimelineQuery, VectorBackend,
    VectorSearchParams,
};
use atlas_core::model::{Chunk, CollectionConfig, CollectionInfo, CollectionStats, QntmKey, Source};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryVectorBackend {
    collections: RwLock<HashMap<String, CollectionConfig>>,
    points: RwLock<HashMap<String, HashMap<String, Point>>>,
}

impl InMemoryVectorBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    atlas_core::embedding::cosine_similarity(a, b)
}

#[async_trait]
impl VectorBackend for InMemoryVectorBackend {
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> anyhow::Result<()> {
        let mut store = self.points.write().unwrap();
        let coll = store.entry(collection.to_string()).or_default();
        for p in points {
            coll.insert(p.id.clone(), p);
        }
        Ok(())
    }

    async fn search(&self, collection: &str, params: VectorSearchParams) -> anyhow::Result<Vec<SearchHit>> {
        let store = self.points.read().unwrap();
        let Some(coll) = store.get(collection) else {
            return Ok(vec![]);
        };
        let mut scored: Vec<(f32, &Point)> = coll
            .values()
            .filter_map(|p| {
                p.vectors
                    .get(&params.vector_name)
                    .map(|v| (cosine(v, &params.vector), p))
            })
            .filter(|(score, _)| params.score_threshold.map(|t| *score >= t).unwrap_or(true))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(params.limit);

        Ok(scored
            .into_iter()
            .map(|(score, p)| SearchHit {
                id: p.id.clone(),
                score,
                payload: if params.with_payload { Some(p.payload.clone()) } else { None },
                vector: if params.with_vector { Some(p.vectors.clone()) } else { None },
            })
            .collect())
    }

    async fn retrieve(&self, collection: &str, ids: &[String]) -> anyhow::Result<Vec<Point>> {
        let store = self.points.read().unwrap();
        let Some(coll) = store.get(collection) else {
            return Ok(vec![]);
        };
        Ok(ids.iter().filter_map(|id| coll.get(id).cloned()).collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> anyhow::Result<()> {
        let mut store = self.points.write().unwrap();
        if let Some(coll) = store.get_mut(collection) {
            for id in ids {
                coll.remove(id);
            }
        }
        Ok(())
    }

    async fn scroll(&self, collection: &str, params: ScrollParams) -> anyhow::Result<ScrollPage> {
        let store = self.points.read().unwrap();
        let Some(coll) = store.get(collection) else {
            return Ok(ScrollPage {
                points: vec![],
                next_offset: None,
            });
        };
        let mut ids: Vec<&String> = coll.keys().collect();
        ids.sort();
        let start = params
            .offset
            .as_ref()
            .and_then(|o| ids.iter().position(|id| *id == o).map(|i| i + 1))
            .unwrap_or(0);
        let end = (start + params.limit).min(ids.len());
        let page: Vec<Point> = ids[start..end].iter().map(|id| coll[*id].clone()).collect();
        let next_offset = if end < ids.len() {
            Some(ids[end - 1].clone())
        } else {
            None
        };
        Ok(ScrollPage {
            points: page,
            next_offset,
        })
    }

    async fn set_payload(
        &self,
        collection: &str,
        ids: &[String],
        partial_payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        let mut store = self.points.write().unwrap();
        if let Some(coll) = store.get_mut(collection) {
            for id in ids {
                if let Some(point) = coll.get_mut(id) {
                    merge_json(&mut point.payload, &partial_payload);
                }
            }
        }
        Ok(())
    }

    async fn exists(&self, collection: &str) -> anyhow::Result<bool> {
        Ok(self.collections.read().unwrap().contains_key(collection))
    }

    async fn create(&self, collection: &str, config: CollectionConfig) -> anyhow::Result<()> {
        self.collections.write().unwrap().insert(collection.to_string(), config);
        self.points.write().unwrap().entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> anyhow::Result<()> {
        self.collections.write().unwrap().remove(collection);
        self.points.write().unwrap().remove(collection);
        Ok(())
    }

    async fn get_info(&self, collection: &str) -> anyhow::Result<CollectionInfo> {
        let store = self.points.read().unwrap();
        let count = store.get(collection).map(|c| c.len()).unwrap_or(0) as u64;
        let dims = self.collections.read().unwrap().get(collection).map(|c| c.dimensions);
        Ok(CollectionInfo {
            points_count: count,
            dimensions: dims,
            segments: Some(1),
        })
    }

    async fn create_payload_index(&self, _: &str, _: &str, _: PayloadIndexSchema) -> anyhow::Result<()> {
        Ok(())
    }

    async fn set_indexing_enabled(&self, _: &str, _: bool) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health(&self) -> bool {
        true
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (k, v) in patch_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Default)]
pub struct InMemoryMetadataBackend {
    sources: RwLock<HashMap<String, Source>>,
    chunks: RwLock<HashMap<String, Chunk>>,
    qntm_keys: RwLock<HashMap<String, QntmKey>>,
    stats: RwLock<HashMap<String, CollectionStats>>,
}

impl InMemoryMetadataBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataBackend for InMemoryMetadataBackend {
    async fn upsert_source(&self, source: &Source) -> anyhow::Result<()> {
        self.sources.write().unwrap().insert(source.path.clone(), source.clone());
        Ok(())
    }

    async fn get_source_by_path(&self, path: &str) -> anyhow::Result<Option<Source>> {
        Ok(self.sources.read().unwrap().get(path).cloned())
    }

    async fn upsert_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        let mut store = self.chunks.write().unwrap();
        for c in chunks {
            store.insert(c.chunk_id.clone(), c.clone());
        }
        Ok(())
    }

    async fn get_chunk_by_id(&self, id: &str) -> anyhow::Result<Option<Chunk>> {
        Ok(self.chunks.read().unwrap().get(id).cloned())
    }

    async fn get_chunks_by_source(&self, source_id: &str) -> anyhow::Result<Vec<Chunk>> {
        Ok(self
            .chunks
            .read()
            .unwrap()
            .values()
            .filter(|c| c.source_id == source_id)
            .cloned()
            .collect())
    }

    async fn get_all_qntm_keys(&self) -> anyhow::Result<Vec<QntmKey>> {
        Ok(self.qntm_keys.read().unwrap().values().cloned().collect())
    }

    async fn record_qntm_keys(&self, _chunk_id: &str, keys: &[String]) -> anyhow::Result<()> {
        let now = chrono::Utc::now();
        let mut store = self.qntm_keys.write().unwrap();
        for key in keys {
            store
                .entry(key.clone())
                .and_modify(|k| {
                    k.last_seen_at = now;
                    k.usage_count += 1;
                })
                .or_insert(QntmKey {
                    key: key.clone(),
                    first_seen_at: now,
                    last_seen_at: now,
                    usage_count: 1,
                });
        }
        Ok(())
    }

    async fn get_collection_stats(&self, collection: &str) -> anyhow::Result<CollectionStats> {
        Ok(self
            .stats
            .read()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_else(|| CollectionStats {
                collection_name: collection.to_string(),
                ..Default::default()
            }))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct NullCacheBackend;

#[async_trait]
impl CacheBackend for NullCacheBackend {
    async fn get_chunk(&self, _id: &str) -> anyhow::Result<Option<Chunk>> {
        Ok(None)
    }
    async fn set_chunk(&self, _chunk: &Chunk) -> anyhow::Result<()> {
        Ok(())
    }
    async fn invalidate_chunk(&self, _id: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn get_qntm_keys(&self) -> anyhow::Result<Option<Vec<QntmKey>>> {
        Ok(None)
    }
    async fn set_qntm_keys(&self, _keys: &[QntmKey]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn invalidate_qntm_keys(&self) -> anyhow::Result<()> {
        Ok(())
    }
    async fn get_stats(&self, _collection: &str) -> anyhow::Result<Option<CollectionStats>> {
        Ok(None)
    }
    async fn set_stats(&self, _stats: &CollectionStats) -> anyhow::Result<()> {
        Ok(())
    }
    async fn invalidate_stats(&self, _collection: &str) -> anyhow::Result<()> {
        Ok(())
    }
    async fn health(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct NullFullTextBackend;

#[async_trait]
impl FullTextBackend for NullFullTextBackend {
    async fn index(&self, _documents: &[FullTextDocument]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn search(&self, _params: FullTextSearchParams) -> anyhow::Result<Vec<FullTextHit>> {
        Ok(vec![])
    }
    async fn health(&self) -> bool {
        true
    }
}

#[derive(Default)]
pub struct NullAnalyticsBackend;

#[async_trait]
impl AnalyticsBackend for NullAnalyticsBackend {
    async fn record_chunks(&self, _chunks: &[Chunk]) -> anyhow::Result<()> {
        Ok(())
    }
    async fn query_timeline(&self, _query: TimelineQuery) -> anyhow::Result<Vec<TimelinePoint>> {
        Ok(vec![])
    }
    async fn export(&self, _request: ExportRequest) -> anyhow::Result<ExportResult> {
        Ok(ExportResult {
            files: vec![],
            row_count: 0,
            duration_ms: 0,
        })
    }
    async fn health(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::model::{CollectionConfig, Distance, HnswParams, VectorName};
    use std::collections::BTreeMap;

    fn point(id: &str, vec: Vec<f32>) -> Point {
        let mut vectors = BTreeMap::new();
        vectors.insert(VectorName::Text.as_str().to_string(), vec);
        Point {
            id: id.to_string(),
            vectors,
            payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_then_search_returns_closest_first() {
        let backend = InMemoryVectorBackend::new();
        backend
            .create(
                "c1",
                CollectionConfig {
                    dimensions: 2,
                    distance: Distance::Cosine,
                    hnsw: HnswParams::default(),
                    quantisation: false,
                },
            )
            .await
            .unwrap();
        backend
            .upsert(
                "c1",
                vec![point("a", vec![1.0, 0.0]), point("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let hits = backend
            .search(
                "c1",
                VectorSearchParams {
                    vector_name: VectorName::Text.as_str().to_string(),
                    vector: vec![1.0, 0.0],
                    limit: 10,
                    filter: Default::default(),
                    score_threshold: None,
                    with_payload: false,
                    with_vector: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn retrieve_silently_drops_missing_ids() {
        let backend = InMemoryVectorBackend::new();
        backend.create("c1", sample_config()).await.unwrap();
        backend.upsert("c1", vec![point("a", vec![1.0, 0.0])]).await.unwrap();

        let points = backend
            .retrieve("c1", &["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
    }

    fn sample_config() -> CollectionConfig {
        CollectionConfig {
            dimensions: 2,
            distance: Distance::Cosine,
            hnsw: HnswParams::default(),
            quantisation: false,
        }
    }
}
