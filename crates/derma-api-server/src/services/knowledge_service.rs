use crate::config::SearchConfig;
use crate::models::assistant::KnowledgeSnippet;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trait for knowledge retrieval
#[async_trait::async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Ranked snippets for a free-text query, at most `top`
    async fn search(&self, query: &str, top: usize) -> Result<Vec<KnowledgeSnippet>>;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    search: &'a str,
    top: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    value: Vec<KnowledgeSnippet>,
}

/// Azure AI Search client over the documents REST API
#[derive(Clone)]
pub struct KnowledgeService {
    client: Client,
    config: SearchConfig,
}

impl KnowledgeService {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    fn search_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index_name,
            self.config.api_version
        )
    }
}

#[async_trait::async_trait]
impl KnowledgeRetriever for KnowledgeService {
    async fn search(&self, query: &str, top: usize) -> Result<Vec<KnowledgeSnippet>> {
        debug!("Searching index '{}' (top {})", self.config.index_name, top);

        let mut builder = self
            .client
            .post(self.search_url())
            .json(&SearchRequest { search: query, top });
        if let Some(key) = &self.config.api_key {
            builder = builder.header("api-key", key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to connect to search service")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search API error ({}): {}", status, body);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        let mut hits = parsed.value;
        hits.truncate(top);
        debug!("Search returned {} snippets", hits.len());
        Ok(hits)
    }
}
