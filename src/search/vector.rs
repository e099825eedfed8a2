use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::Document;

/// A stored vector entry
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorEntry {
    content: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    embedding: Vec<f32>,
}

/// A document returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// In-memory vector store with disk persistence and cosine similarity search.
pub struct VectorStore {
    entries: RwLock<Vec<VectorEntry>>,
    persist_path: PathBuf,
}

impl VectorStore {
    pub fn open_or_create(vector_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(vector_dir)?;
        let persist_path = vector_dir.join("vectors.json");

        let entries = if persist_path.exists() {
            let data = std::fs::read_to_string(&persist_path).context("Failed to read vector store")?;
            match serde_json::from_str(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Vector store at {} is unreadable, starting empty: {e}", persist_path.display());
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            persist_path,
        })
    }

    /// Replace the whole store. `embeddings` must be parallel with `documents`.
    pub fn replace_all(&self, documents: Vec<Document>, embeddings: Vec<Vec<f32>>) -> Result<()> {
        if documents.len() != embeddings.len() {
            anyhow::bail!(
                "Got {} embeddings for {} documents",
                embeddings.len(),
                documents.len()
            );
        }

        let fresh: Vec<VectorEntry> = documents
            .into_iter()
            .zip(embeddings)
            .map(|(doc, embedding)| VectorEntry {
                content: doc.content,
                metadata: doc.metadata,
                embedding,
            })
            .collect();

        let mut entries = self.entries.write();
        *entries = fresh;
        self.persist(&entries)
    }

    fn persist(&self, entries: &[VectorEntry]) -> Result<()> {
        let data = serde_json::to_string(entries)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data).context("Failed to write vector store")?;
        std::fs::rename(&tmp_path, &self.persist_path).context("Failed to replace vector store")?;
        Ok(())
    }

    /// Up to `limit` documents with cosine similarity of at least `threshold`,
    /// best match first.
    pub fn search(&self, query_embedding: &[f32], limit: usize, threshold: f32) -> Vec<ScoredDocument> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score >= threshold)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| ScoredDocument {
                document: Document {
                    content: e.content.clone(),
                    metadata: e.metadata.clone(),
                },
                score,
            })
            .collect()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
