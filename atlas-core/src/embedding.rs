//! Embedding provider trait and the raw-vector codec used to move
//! embeddings in and out of backends that store them as opaque blobs.

use crate::model::{ContentType, VectorName};
use async_trait::async_trait;

/// Produces vectors for one named modality (text, code, or media).
///
/// Implementors are app-level (network calls, local model inference); this
/// trait lives in core so the search and tracker logic can depend on the
/// capability without depending on any concrete provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier persisted alongside vectors, e.g. `"text-embedding-3-small"`.
    fn model_name(&self) -> &str;

    /// Output vector width.
    fn dims(&self) -> usize;

    /// Which named vector slot this provider fills.
    fn vector_name(&self) -> VectorName;

    /// Which content types this provider can embed.
    fn supports(&self, content_type: ContentType) -> bool;

    /// Embed a batch of chunk texts. Implementations should batch requests
    /// to the underlying model rather than issuing one call per text.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embed a single query string for search-time lookup.
    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut out = self.embed_batch(std::slice::from_ref(&text.to_string())).await?;
        out.pop().ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))
    }
}

/// Little-endian f32 byte codec, used by backends that store vectors as
/// opaque blobs (e.g. a cache tier) rather than native vector columns.
pub fn vec_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

pub fn blob_to_vec(bytes: &[u8]) -> anyhow::Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        anyhow::bail!("blob length {} is not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty, mismatched-length,
/// or near-zero-norm inputs rather than producing `NaN`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.0_f32, -2.5, 0.0, 3.25];
        let blob = vec_to_blob(&v);
        let back = blob_to_vec(&blob).unwrap();
        assert_eq!(v, back);
    }

    #[test]
    fn blob_rejects_misaligned_length() {
        assert!(blob_to_vec(&[0, 1, 2]).is_err());
    }

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_is_zero() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_mismatched_length_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
