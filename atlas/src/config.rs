//! Configuration shape for the ingestion-and-search daemon core.
//!
//! `Config` is `serde::Deserialize` so a host binary can parse it from
//! whatever format it likes (TOML, YAML, env-derived JSON); loading and
//! parsing the configuration file is deliberately left to that host, not to
//! this crate. [`Config::validate`] enforces the cross-field invariants a
//! deserialized value must satisfy before it's handed to [`crate::orchestrator::Orchestrator`].

use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub vector: VectorConfig,
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fulltext: FullTextConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    pub pipeline: PipelineConfig,
    pub ingest: IngestConfig,
    pub embedder: EmbedderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorConfig {
    pub url: String,
    pub collection: String,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    #[serde(default = "default_distance")]
    pub distance: String,
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: u32,
    #[serde(default = "default_hnsw_ef_construct")]
    pub hnsw_ef_construct: u32,
}

fn default_dimensions() -> usize {
    1536
}
fn default_distance() -> String {
    "cosine".to_string()
}
fn default_hnsw_m() -> u32 {
    16
}
fn default_hnsw_ef_construct() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FullTextConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for FullTextConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

impl FullTextConfig {
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { path: None }
    }
}

impl AnalyticsConfig {
    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_initial_concurrency")]
    pub initial_concurrency: usize,
    #[serde(default = "default_min_concurrency")]
    pub min_concurrency: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_monitor_ms")]
    pub monitor_ms: u64,
}

fn default_initial_concurrency() -> usize {
    4
}
fn default_min_concurrency() -> usize {
    1
}
fn default_max_concurrency() -> usize {
    16
}
fn default_monitor_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_max_chunk_chars() -> usize {
    2000
}
fn default_debounce_ms() -> u64 {
    250
}
fn default_poll_interval_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedderConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

impl Config {
    /// Cross-field validation beyond what `serde` already enforces. Mirrors
    /// the ranges §4 names explicitly rather than leaving them implicit.
    pub fn validate(&self) -> Result<()> {
        if self.vector.dimensions == 0 {
            bail!("vector.dimensions must be > 0");
        }
        if !matches!(self.vector.distance.as_str(), "cosine" | "dot" | "euclidean") {
            bail!(
                "vector.distance must be one of cosine|dot|euclidean, got '{}'",
                self.vector.distance
            );
        }
        if self.pipeline.min_concurrency == 0 {
            bail!("pipeline.min_concurrency must be >= 1");
        }
        if self.pipeline.max_concurrency < self.pipeline.min_concurrency {
            bail!("pipeline.max_concurrency must be >= pipeline.min_concurrency");
        }
        if !(self.pipeline.min_concurrency..=self.pipeline.max_concurrency)
            .contains(&self.pipeline.initial_concurrency)
        {
            bail!("pipeline.initial_concurrency must fall within [min_concurrency, max_concurrency]");
        }
        if self.ingest.poll_interval_ms < 10 {
            bail!("ingest.poll_interval_ms must be >= 10 (scheduler's configured minimum)");
        }
        if self.ingest.max_chunk_chars == 0 {
            bail!("ingest.max_chunk_chars must be > 0");
        }
        match self.embedder.provider.as_str() {
            "disabled" => {}
            other => {
                if self.embedder.dims.is_none() {
                    bail!("embedder.dims must be set when provider is '{other}'");
                }
                if self.embedder.model.is_none() {
                    bail!("embedder.model must be set when provider is '{other}'");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            vector: VectorConfig {
                url: "http://localhost:6334".into(),
                collection: "atlas".into(),
                dimensions: 1536,
                distance: "cosine".into(),
                hnsw_m: 16,
                hnsw_ef_construct: 100,
            },
            postgres: PostgresConfig {
                url: "postgres://localhost/atlas".into(),
                max_connections: 5,
            },
            cache: CacheConfig::default(),
            fulltext: FullTextConfig::default(),
            analytics: AnalyticsConfig::default(),
            pipeline: PipelineConfig {
                initial_concurrency: 4,
                min_concurrency: 1,
                max_concurrency: 16,
                monitor_ms: 1000,
            },
            ingest: IngestConfig {
                max_chunk_chars: 2000,
                debounce_ms: 250,
                poll_interval_ms: 5000,
            },
            embedder: EmbedderConfig {
                provider: "disabled".into(),
                model: None,
                dims: None,
                batch_size: 64,
                max_retries: 5,
            },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn initial_concurrency_out_of_range_rejected() {
        let mut c = sample_config();
        c.pipeline.initial_concurrency = 100;
        assert!(c.validate().is_err());
    }

    #[test]
    fn enabled_embedder_without_dims_rejected() {
        let mut c = sample_config();
        c.embedder.provider = "openai".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn poll_interval_below_floor_rejected() {
        let mut c = sample_config();
        c.ingest.poll_interval_ms = 5;
        assert!(c.validate().is_err());
    }
}
