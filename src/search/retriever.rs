use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{EmbeddingConfig, RetrieverConfig};
use crate::llm::embeddings::embed_single;
use crate::models::Document;
use crate::search::vector::VectorStore;

/// Nearest-neighbour document lookup for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Candidates ordered best-first. The retriever applies its own cut-off.
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;
}

/// Embeds the query and searches the local vector store.
pub struct VectorRetriever {
    client: reqwest::Client,
    embedding: EmbeddingConfig,
    store: Arc<VectorStore>,
    top_k: usize,
    score_threshold: f32,
}

impl VectorRetriever {
    pub fn new(
        client: reqwest::Client,
        embedding: EmbeddingConfig,
        store: Arc<VectorStore>,
        config: &RetrieverConfig,
    ) -> Self {
        Self {
            client,
            embedding,
            store,
            top_k: config.top_k,
            score_threshold: config.score_threshold,
        }
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let query_embedding = embed_single(&self.client, &self.embedding, query)
            .await
            .context("Failed to embed query")?;

        let hits = self.store.search(&query_embedding, self.top_k, self.score_threshold);
        tracing::debug!(
            "Retrieved {} of {} indexed chunks (top_k={}, threshold={})",
            hits.len(),
            self.store.entry_count(),
            self.top_k,
            self.score_threshold
        );

        for hit in &hits {
            tracing::debug!(
                "  {:.3} {}",
                hit.score,
                hit.document.source().unwrap_or("<unknown source>")
            );
        }

        Ok(hits.into_iter().map(|h| h.document).collect())
    }
}
