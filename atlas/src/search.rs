//! Search engine (§4.N): wraps the storage coordinator and the embedder
//! registry, implementing the three query modes. Hybrid fusion is priority
//! concatenation per `atlas_core::search::fuse_hybrid`, never the teacher's
//! weighted min-max blend — semantic and keyword scores are never fused
//! into a single number.

use atlas_core::backend::{FullTextSearchParams, VectorSearchParams};
use atlas_core::filter::translate::to_fulltext_filter;
use atlas_core::filter::Filter;
use atlas_core::search::{fuse_hybrid, Origin, SearchResultItem};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::coordinator::StorageCoordinator;
use crate::embedding::EmbedderRegistry;

pub struct SearchEngine {
    coordinator: Arc<StorageCoordinator>,
    embedder: Arc<EmbedderRegistry>,
    collection: String,
    branch_timeout: Duration,
}

impl SearchEngine {
    pub fn new(
        coordinator: Arc<StorageCoordinator>,
        embedder: Arc<EmbedderRegistry>,
        collection: impl Into<String>,
        branch_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            embedder,
            collection: collection.into(),
            branch_timeout,
        }
    }

    /// Merges the fixed search-inclusion policy with a caller-supplied
    /// filter. The base filter only ever populates `must_not`, so this is a
    /// safe concatenation: it never merges two independent `should` groups.
    fn effective_filter(&self, user_filter: Filter) -> Filter {
        let base = Filter::deletion_eligible_exclusion();
        debug_assert!(base.should.is_empty(), "base policy must never populate `should`");
        Filter {
            must: user_filter.must,
            must_not: base.must_not.into_iter().chain(user_filter.must_not).collect(),
            should: user_filter.should,
        }
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        limit: usize,
        user_filter: Filter,
        score_threshold: Option<f32>,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        let filter = self.effective_filter(user_filter);
        let vector = self.embedder.embed_query(query).await?;
        let hits = self
            .coordinator
            .search_semantic(
                &self.collection,
                VectorSearchParams {
                    vector_name: "text".to_string(),
                    vector,
                    limit,
                    filter,
                    score_threshold,
                    with_payload: true,
                    with_vector: false,
                },
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchResultItem {
                id: hit.id,
                score: hit.score,
                payload: hit.payload.unwrap_or(serde_json::Value::Null),
                origin: Origin::Semantic,
            })
            .collect())
    }

    pub async fn keyword_search(
        &self,
        query: &str,
        limit: usize,
        user_filter: Filter,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        let filter = self.effective_filter(user_filter);
        let translated = to_fulltext_filter(&filter);
        let hits = self
            .coordinator
            .full_text_search(
                &self.collection,
                FullTextSearchParams {
                    query: query.to_string(),
                    limit,
                    filter: if translated.is_empty() { None } else { Some(translated) },
                },
            )
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchResultItem {
                id: hit.id,
                score: hit.score,
                payload: hit.payload.unwrap_or(serde_json::Value::Null),
                origin: Origin::Keyword,
            })
            .collect())
    }

    /// Runs the semantic and keyword branches concurrently, each under its
    /// own timeout; a branch that times out contributes no results but does
    /// not fail the other.
    pub async fn hybrid_search(
        &self,
        query: &str,
        limit: usize,
        user_filter: Filter,
    ) -> anyhow::Result<Vec<SearchResultItem>> {
        let (semantic, keyword) = tokio::join!(
            tokio::time::timeout(self.branch_timeout, self.semantic_search(query, limit, user_filter.clone(), None)),
            tokio::time::timeout(self.branch_timeout, self.keyword_search(query, limit, user_filter)),
        );

        let semantic = match semantic {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!("semantic branch of hybrid search failed: {e}");
                Vec::new()
            }
            Err(_) => {
                warn!("semantic branch of hybrid search timed out");
                Vec::new()
            }
        };
        let keyword = match keyword {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!("keyword branch of hybrid search failed: {e}");
                Vec::new()
            }
            Err(_) => {
                warn!("keyword branch of hybrid search timed out");
                Vec::new()
            }
        };

        Ok(fuse_hybrid(semantic, keyword, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_filter_never_merges_should_groups() {
        use atlas_core::filter::Condition;
        let engine_filter = Filter {
            must: vec![],
            must_not: vec![Condition::Eq {
                key: "deletion_eligible".into(),
                value: serde_json::Value::Bool(true),
            }],
            should: vec![],
        };
        let user = Filter {
            must: vec![],
            must_not: vec![],
            should: vec![
                Condition::Eq {
                    key: "a".into(),
                    value: serde_json::Value::Bool(true),
                },
                Condition::Eq {
                    key: "b".into(),
                    value: serde_json::Value::Bool(true),
                },
            ],
        };
        let combined = Filter {
            must: user.must.clone(),
            must_not: engine_filter.must_not.clone().into_iter().chain(user.must_not.clone()).collect(),
            should: user.should.clone(),
        };
        assert_eq!(combined.should.len(), 2);
        assert_eq!(combined.must_not.len(), 1);
    }
}
