//! Full-text backend (§4.J): an inverted-index service reached over HTTP.
//! Tokenisation/stemming policy belongs to that service; this backend only
//! serialises requests and deserialises responses.

use atlas_core::backend::{FullTextBackend, FullTextDocument, FullTextHit, FullTextSearchParams};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

pub struct HttpFullTextBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpFullTextBackend {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[derive(Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: &'a Option<String>,
}

#[async_trait]
impl FullTextBackend for HttpFullTextBackend {
    async fn index(&self, documents: &[FullTextDocument]) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/documents", self.endpoint))
            .json(documents)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("full-text index request failed with status {}", response.status());
        }
        Ok(())
    }

    async fn search(&self, params: FullTextSearchParams) -> anyhow::Result<Vec<FullTextHit>> {
        let body = SearchRequestBody {
            query: &params.query,
            limit: params.limit,
            filter: &params.filter,
        };
        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("full-text search request failed with status {}", response.status());
        }
        Ok(response.json::<Vec<FullTextHit>>().await?)
    }

    async fn health(&self) -> bool {
        self.client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
