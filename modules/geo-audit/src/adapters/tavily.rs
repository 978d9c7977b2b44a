use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use geo_common::EvidenceRecord;

use super::ClientSlot;
use crate::traits::{SearchQuery, WebSearcher};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

/// Tavily web search adapter.
pub struct TavilySearcher {
    api_key: String,
    client: ClientSlot<reqwest::Client>,
}

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TavilySearchResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl TavilySearcher {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to build Tavily HTTP client")?;
        Ok(Self {
            api_key: api_key.into(),
            client: ClientSlot::new("Tavily", client),
        })
    }
}

#[async_trait]
impl WebSearcher for TavilySearcher {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<EvidenceRecord>> {
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query: &query.query,
            search_depth: query.depth.as_str(),
            max_results: query.max_results,
        };

        let resp = self
            .client
            .get()?
            .post(TAVILY_SEARCH_URL)
            .json(&request)
            .send()
            .await
            .context("Tavily request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Tavily returned {status}: {body}");
        }

        let body: TavilySearchResponse = resp.json().await.context("Invalid Tavily response")?;
        info!(query = %query.query, results = body.results.len(), "Tavily search complete");

        Ok(body
            .results
            .into_iter()
            .map(|r| EvidenceRecord {
                title: r.title,
                url: r.url,
                content: r.content,
            })
            .collect())
    }

    async fn close(&self) {
        if self.client.release() {
            debug!("Tavily searcher closed");
        }
    }
}
