//! Embedder capability set (§4.E): selects among registered
//! [`EmbeddingProvider`] implementations by content type, degrading to the
//! `text` capability with a warning when the preferred one is unavailable.

use atlas_core::embedding::EmbeddingProvider;
use atlas_core::model::ContentType;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Result of embedding a batch, including the provenance needed to persist
/// alongside each chunk.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub embeddings: Vec<Vec<f32>>,
    pub model: String,
    pub dimensions: usize,
    /// Set when the requested capability wasn't available and the registry
    /// fell back to `text`.
    pub degraded_from: Option<ContentType>,
}

/// Dispatches embedding requests to the provider registered for a content
/// type, with `text` as the universal fallback capability.
pub struct EmbedderRegistry {
    providers: HashMap<ContentType, Arc<dyn EmbeddingProvider>>,
}

impl EmbedderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    pub fn register(&mut self, content_type: ContentType, provider: Arc<dyn EmbeddingProvider>) {
        self.providers.insert(content_type, provider);
    }

    /// code → code, text → text, media → multimodal, selection falls back
    /// to `text` with a warning if the preferred capability is unavailable.
    fn select(&self, content_type: ContentType) -> (ContentType, Option<Arc<dyn EmbeddingProvider>>) {
        if let Some(p) = self.providers.get(&content_type) {
            return (content_type, Some(Arc::clone(p)));
        }
        if content_type != ContentType::Text {
            warn!(?content_type, "embedder capability unavailable, degrading to text");
            if let Some(p) = self.providers.get(&ContentType::Text) {
                return (ContentType::Text, Some(Arc::clone(p)));
            }
        }
        (ContentType::Text, None)
    }

    pub async fn embed_batch(&self, texts: &[String], content_type: ContentType) -> anyhow::Result<BatchResult> {
        let (resolved, provider) = self.select(content_type);
        let provider = provider.ok_or_else(|| anyhow::anyhow!("no embedder registered for any capability"))?;
        let embeddings = provider.embed_batch(texts).await?;
        Ok(BatchResult {
            embeddings,
            model: provider.model_name().to_string(),
            dimensions: provider.dims(),
            degraded_from: if resolved != content_type {
                Some(content_type)
            } else {
                None
            },
        })
    }

    pub async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let provider = self
            .providers
            .get(&ContentType::Text)
            .ok_or_else(|| anyhow::anyhow!("no text embedder registered for query embedding"))?;
        provider.embed_query(text).await
    }
}

impl Default for EmbedderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic, dependency-free embedder used in tests: hashes each
/// token into a fixed-width vector. Never used outside test builds.
pub struct FakeEmbedder {
    model: String,
    dims: usize,
    vector_name: atlas_core::model::VectorName,
    capability: ContentType,
}

impl FakeEmbedder {
    pub fn new(model: impl Into<String>, dims: usize, vector_name: atlas_core::model::VectorName, capability: ContentType) -> Self {
        Self {
            model: model.into(),
            dims,
            vector_name,
            capability,
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dims] += byte as f32 / 255.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn vector_name(&self) -> atlas_core::model::VectorName {
        self.vector_name
    }

    fn supports(&self, content_type: ContentType) -> bool {
        content_type == self.capability
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::model::VectorName;

    #[tokio::test]
    async fn selects_matching_capability() {
        let mut registry = EmbedderRegistry::new();
        registry.register(
            ContentType::Text,
            Arc::new(FakeEmbedder::new("fake-text", 8, VectorName::Text, ContentType::Text)),
        );
        registry.register(
            ContentType::Code,
            Arc::new(FakeEmbedder::new("fake-code", 8, VectorName::Code, ContentType::Code)),
        );

        let result = registry
            .embed_batch(&["fn main() {}".to_string()], ContentType::Code)
            .await
            .unwrap();
        assert_eq!(result.model, "fake-code");
        assert!(result.degraded_from.is_none());
    }

    #[tokio::test]
    async fn degrades_to_text_when_capability_missing() {
        let mut registry = EmbedderRegistry::new();
        registry.register(
            ContentType::Text,
            Arc::new(FakeEmbedder::new("fake-text", 8, VectorName::Text, ContentType::Text)),
        );

        let result = registry
            .embed_batch(&["a picture".to_string()], ContentType::Media)
            .await
            .unwrap();
        assert_eq!(result.model, "fake-text");
        assert_eq!(result.degraded_from, Some(ContentType::Media));
    }

    #[tokio::test]
    async fn no_providers_registered_errors() {
        let registry = EmbedderRegistry::new();
        let result = registry.embed_batch(&["x".to_string()], ContentType::Text).await;
        assert!(result.is_err());
    }
}
