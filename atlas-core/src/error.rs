//! Typed error surface shared by the core and the app crate.
//!
//! Call sites that can classify a failure use [`AtlasError`] directly;
//! everything else propagates with `anyhow::Result` and is classified at
//! the boundary (e.g. the storage coordinator) where a fatal/degraded
//! decision must be made.

use thiserror::Error;

/// Which storage tier a backend failure occurred on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Vector,
    Metadata,
    Cache,
    FullText,
    Analytics,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Tier::Vector => "vector",
            Tier::Metadata => "metadata",
            Tier::Cache => "cache",
            Tier::FullText => "fulltext",
            Tier::Analytics => "analytics",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("{tier} backend unavailable: {message}")]
    BackendUnavailable { tier: Tier, message: String },

    #[error("{tier} backend timed out after {elapsed_ms}ms")]
    BackendTimeout { tier: Tier, elapsed_ms: u64 },

    #[error("filter could not be translated for {tier}: {reason}")]
    FilterTranslation { tier: Tier, reason: String },

    #[error("chunker I/O error: {0}")]
    ChunkerIo(String),

    #[error("embedder failed: {0}")]
    EmbedderFailure(String),

    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),
}

impl AtlasError {
    /// Whether this error should be treated as a fatal failure of the
    /// write path (vector/metadata), versus a degraded, logged-and-continue
    /// failure (cache/fulltext/analytics).
    pub fn is_fatal_for_write(&self) -> bool {
        matches!(
            self,
            AtlasError::BackendUnavailable {
                tier: Tier::Vector | Tier::Metadata,
                ..
            } | AtlasError::BackendTimeout {
                tier: Tier::Vector | Tier::Metadata,
                ..
            } | AtlasError::ConsistencyViolation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_unavailable_is_fatal() {
        let e = AtlasError::BackendUnavailable {
            tier: Tier::Vector,
            message: "connection refused".into(),
        };
        assert!(e.is_fatal_for_write());
    }

    #[test]
    fn cache_unavailable_is_not_fatal() {
        let e = AtlasError::BackendUnavailable {
            tier: Tier::Cache,
            message: "connection refused".into(),
        };
        assert!(!e.is_fatal_for_write());
    }
}
