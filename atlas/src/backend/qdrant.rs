//! Vector backend (§4.G) over Qdrant.

use atlas_core::backend::{
    NamedVectors as AtlasNamedVectors, PayloadIndexSchema, Point, ScrollPage, ScrollParams,
    SearchHit, VectorBackend, VectorSearchParams,
};
use atlas_core::filter::translate::{to_vector_filter, VectorCondition, VectorFilterPlan};
use atlas_core::model::{CollectionConfig, CollectionInfo, Distance};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config::Config as VectorsConfigEnum, Condition as QCondition, CreateCollection,
    DeletePoints, Distance as QDistance, FieldType, Filter as QFilter, GetCollectionInfoRequest,
    HnswConfigDiff, Match, PointId, PointStruct, PointsIdsList, PointsSelector, Range as QRange,
    ScrollPoints, SearchPoints, SetPayloadPoints, UpsertPoints, Value as QValue, VectorParams,
    VectorsConfig, WithPayloadSelector, WithVectorsSelector,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;

pub struct QdrantVectorBackend {
    client: Qdrant,
}

impl QdrantVectorBackend {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = Qdrant::from_url(url).build()?;
        Ok(Self { client })
    }
}

fn distance_to_qdrant(d: Distance) -> QDistance {
    match d {
        Distance::Cosine => QDistance::Cosine,
        Distance::Dot => QDistance::Dot,
        Distance::Euclidean => QDistance::Euclid,
    }
}

fn json_to_qdrant_value(v: &serde_json::Value) -> QValue {
    QValue::from(serde_json::from_value::<serde_json::Value>(v.clone()).unwrap_or(serde_json::Value::Null))
}

fn payload_to_map(payload: &serde_json::Value) -> HashMap<String, QValue> {
    match payload.as_object() {
        Some(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
            .collect(),
        None => HashMap::new(),
    }
}

fn lower_vector_condition(c: &VectorCondition) -> QCondition {
    match c {
        VectorCondition::MatchValue { key, value } => {
            QCondition::matches(key.clone(), json_to_match(value))
        }
        VectorCondition::MatchAny { key, values } => QCondition::matches(
            key.clone(),
            Match::new_any(values.iter().map(value_to_string).collect::<Vec<_>>()),
        ),
        VectorCondition::MatchExcept { key, values } => QCondition::matches(
            key.clone(),
            Match::new_except(values.iter().map(value_to_string).collect::<Vec<_>>()),
        ),
        VectorCondition::Range { key, gt, gte, lt, lte } => QCondition::range(
            key.clone(),
            QRange {
                gt: gt.as_ref().and_then(|v| v.as_f64()),
                gte: gte.as_ref().and_then(|v| v.as_f64()),
                lt: lt.as_ref().and_then(|v| v.as_f64()),
                lte: lte.as_ref().and_then(|v| v.as_f64()),
            },
        ),
        VectorCondition::IdInSet { ids } => QCondition::has_id(
            ids.iter()
                .map(|id| PointId::from(id.clone()))
                .collect::<Vec<_>>(),
        ),
        VectorCondition::FieldIsNull { key } => QCondition::is_null(key.clone()),
        VectorCondition::FieldIsAbsent { key } => QCondition::is_empty(key.clone()),
        VectorCondition::Or(parts) => QCondition::filter(QFilter {
            should: parts.iter().map(lower_vector_condition).collect(),
            ..Default::default()
        }),
    }
}

fn json_to_match(v: &serde_json::Value) -> Match {
    match v {
        serde_json::Value::Bool(b) => Match::new_bool(*b),
        serde_json::Value::Number(n) if n.is_i64() => Match::new_int(n.as_i64().unwrap()),
        other => Match::new_text(value_to_string(other)),
    }
}

fn value_to_string(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn plan_to_filter(plan: &VectorFilterPlan) -> Option<QFilter> {
    if plan.is_empty() {
        return None;
    }
    Some(QFilter {
        must: plan.must.iter().map(lower_vector_condition).collect(),
        must_not: plan.must_not.iter().map(lower_vector_condition).collect(),
        should: plan.should.iter().map(lower_vector_condition).collect(),
        ..Default::default()
    })
}

#[async_trait]
impl VectorBackend for QdrantVectorBackend {
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> anyhow::Result<()> {
        let qdrant_points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let vectors: AtlasNamedVectors = p.vectors;
                PointStruct::new(
                    p.id,
                    vectors
                        .into_iter()
                        .map(|(name, vec)| (name, vec))
                        .collect::<HashMap<String, Vec<f32>>>(),
                    payload_to_map(&p.payload),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPoints {
                collection_name: collection.to_string(),
                points: qdrant_points,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn search(&self, collection: &str, params: VectorSearchParams) -> anyhow::Result<Vec<SearchHit>> {
        let plan = to_vector_filter(&params.filter);
        let filter = plan_to_filter(&plan);

        let response = self
            .client
            .search_points(SearchPoints {
                collection_name: collection.to_string(),
                vector: params.vector,
                vector_name: Some(params.vector_name),
                limit: params.limit as u64,
                filter,
                score_threshold: params.score_threshold,
                with_payload: Some(WithPayloadSelector::from(params.with_payload)),
                with_vectors: Some(WithVectorsSelector::from(params.with_vector)),
                ..Default::default()
            })
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|scored| SearchHit {
                id: scored.id.map(|id| id.to_string()).unwrap_or_default(),
                score: scored.score,
                payload: Some(serde_json::to_value(&scored.payload).unwrap_or(serde_json::Value::Null)),
                vector: None,
            })
            .collect())
    }

    async fn retrieve(&self, collection: &str, ids: &[String]) -> anyhow::Result<Vec<Point>> {
        let response = self
            .client
            .get_points(
                collection,
                None,
                &ids.iter().map(|id| PointId::from(id.clone())).collect::<Vec<_>>(),
                Some(true),
                Some(true),
                None,
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .map(|record| Point {
                id: record.id.map(|id| id.to_string()).unwrap_or_default(),
                vectors: AtlasNamedVectors::new(),
                payload: serde_json::to_value(&record.payload).unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> anyhow::Result<()> {
        self.client
            .delete_points(DeletePoints {
                collection_name: collection.to_string(),
                points: Some(PointsSelector::from(PointsIdsList {
                    ids: ids.iter().map(|id| PointId::from(id.clone())).collect(),
                })),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn scroll(&self, collection: &str, params: ScrollParams) -> anyhow::Result<ScrollPage> {
        let plan = to_vector_filter(&params.filter);
        let filter = plan_to_filter(&plan);

        let response = self
            .client
            .scroll(ScrollPoints {
                collection_name: collection.to_string(),
                filter,
                limit: Some(params.limit as u32),
                offset: params.offset.map(|o| PointId::from(o)),
                with_payload: Some(WithPayloadSelector::from(true)),
                with_vectors: Some(WithVectorsSelector::from(true)),
                ..Default::default()
            })
            .await?;

        Ok(ScrollPage {
            points: response
                .result
                .into_iter()
                .map(|record| Point {
                    id: record.id.map(|id| id.to_string()).unwrap_or_default(),
                    vectors: AtlasNamedVectors::new(),
                    payload: serde_json::to_value(&record.payload).unwrap_or(serde_json::Value::Null),
                })
                .collect(),
            next_offset: response.next_page_offset.map(|id| id.to_string()),
        })
    }

    async fn set_payload(
        &self,
        collection: &str,
        ids: &[String],
        partial_payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.client
            .set_payload(SetPayloadPoints {
                collection_name: collection.to_string(),
                points_selector: Some(PointsSelector::from(PointsIdsList {
                    ids: ids.iter().map(|id| PointId::from(id.clone())).collect(),
                })),
                payload: payload_to_map(&partial_payload),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn exists(&self, collection: &str) -> anyhow::Result<bool> {
        match self
            .client
            .collection_info(GetCollectionInfoRequest {
                collection_name: collection.to_string(),
            })
            .await
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn create(&self, collection: &str, config: CollectionConfig) -> anyhow::Result<()> {
        self.client
            .create_collection(CreateCollection {
                collection_name: collection.to_string(),
                vectors_config: Some(VectorsConfig {
                    config: Some(VectorsConfigEnum::Params(VectorParams {
                        size: config.dimensions as u64,
                        distance: distance_to_qdrant(config.distance).into(),
                        ..Default::default()
                    })),
                }),
                hnsw_config: Some(HnswConfigDiff {
                    m: Some(config.hnsw.m),
                    ef_construct: Some(config.hnsw.ef_construct),
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn delete_collection(&self, collection: &str) -> anyhow::Result<()> {
        self.client.delete_collection(collection).await?;
        Ok(())
    }

    async fn get_info(&self, collection: &str) -> anyhow::Result<CollectionInfo> {
        let info = self
            .client
            .collection_info(GetCollectionInfoRequest {
                collection_name: collection.to_string(),
            })
            .await?;
        let result = info.result.unwrap_or_default();
        Ok(CollectionInfo {
            points_count: result.points_count.unwrap_or(0),
            dimensions: None,
            segments: Some(result.segments_count as u32),
        })
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        schema: PayloadIndexSchema,
    ) -> anyhow::Result<()> {
        let field_type = match schema {
            PayloadIndexSchema::Keyword => FieldType::Keyword,
            PayloadIndexSchema::Integer => FieldType::Integer,
            PayloadIndexSchema::Float => FieldType::Float,
            PayloadIndexSchema::Bool => FieldType::Bool,
            PayloadIndexSchema::Datetime => FieldType::Datetime,
        };
        self.client
            .create_field_index(collection, field, field_type, None, None)
            .await?;
        Ok(())
    }

    async fn set_indexing_enabled(&self, collection: &str, enabled: bool) -> anyhow::Result<()> {
        // Qdrant's bulk-load fast path: raise `indexing_threshold` to a huge
        // value to suppress HNSW building, and drop it back to rebuild.
        let threshold = if enabled { Some(20_000) } else { Some(0) };
        self.client
            .update_collection(qdrant_client::qdrant::UpdateCollection {
                collection_name: collection.to_string(),
                optimizers_config: Some(qdrant_client::qdrant::OptimizersConfigDiff {
                    indexing_threshold: threshold,
                    ..Default::default()
                }),
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    async fn health(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}
