//! Live web search used when retrieved site content is not good enough.
//!
//! Talks to a Tavily-compatible `POST /search` endpoint.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::WebSearchConfig;
use crate::models::WebResult;

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>>;
}

pub struct TavilySearch {
    client: reqwest::Client,
    config: WebSearchConfig,
}

impl TavilySearch {
    pub fn new(client: reqwest::Client, config: WebSearchConfig) -> Self {
        Self { client, config }
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    content: String,
}

#[async_trait]
impl WebSearch for TavilySearch {
    async fn search(&self, query: &str) -> Result<Vec<WebResult>> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .context("Web search API key not configured")?;

        let url = format!("{}/search", self.config.base_url.trim_end_matches('/'));
        let req = SearchRequest {
            api_key,
            query,
            max_results: self.config.max_results,
            search_depth: "basic",
        };

        let resp = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&req)
            .send()
            .await
            .context("Failed to reach web search API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Web search API returned {status}: {body}");
        }

        let body: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse web search response")?;

        Ok(into_web_results(body, self.config.max_results))
    }
}

fn into_web_results(body: SearchResponse, max_results: usize) -> Vec<WebResult> {
    body.results
        .into_iter()
        .filter(|r| !r.content.trim().is_empty())
        .take(max_results)
        .map(|r| WebResult {
            content: r.content,
            url: r.url,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tavily_response() {
        let raw = r#"{
            "query": "rust axum",
            "results": [
                {"title": "Axum", "url": "https://docs.rs/axum", "content": "Web framework", "score": 0.9},
                {"title": "Empty", "url": "https://example.com", "content": "  "},
                {"title": "Tokio", "url": "https://tokio.rs", "content": "Async runtime", "score": 0.7}
            ]
        }"#;
        let body: SearchResponse = serde_json::from_str(raw).unwrap();
        let results = into_web_results(body, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://docs.rs/axum");
        assert_eq!(results[1].content, "Async runtime");
    }

    #[test]
    fn test_results_capped() {
        let raw = r#"{"results": [
            {"url": "a", "content": "1"}, {"url": "b", "content": "2"}, {"url": "c", "content": "3"}
        ]}"#;
        let body: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(into_web_results(body, 2).len(), 2);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_error() {
        let search = TavilySearch::new(reqwest::Client::new(), WebSearchConfig::default());
        let err = search.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("API key"));
    }
}
