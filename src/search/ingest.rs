//! Builds the vector store from the site's own pages.
//!
//! Pages are flattened to text, split into paragraph-aligned chunks under a
//! character budget, embedded in one batch and swapped into the store.

use std::path::Path;

use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Node};
use walkdir::WalkDir;

use crate::config::EmbeddingConfig;
use crate::llm::embeddings::embed_batch;
use crate::models::{Document, SOURCE_KEY};
use crate::search::vector::VectorStore;

/// Maximum non-whitespace characters per chunk.
const CHAR_BUDGET: usize = 1000;

const INDEXED_EXTENSIONS: &[&str] = &["html", "htm", "md", "txt"];

/// Index every supported file under `corpus_dir`, replacing the store contents.
/// Returns the number of chunks written.
pub async fn index_corpus(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    store: &VectorStore,
    corpus_dir: &Path,
) -> Result<usize> {
    let documents = load_corpus(corpus_dir)?;
    if documents.is_empty() {
        tracing::warn!("No indexable files found under {}", corpus_dir.display());
        return Ok(0);
    }

    let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
    let embeddings = embed_batch(client, config, &texts)
        .await
        .context("Failed to embed corpus")?;

    let count = documents.len();
    store.replace_all(documents, embeddings)?;
    tracing::info!("Indexed {count} chunks from {}", corpus_dir.display());
    Ok(count)
}

/// Read and chunk all supported files, sorted by path for a stable order.
pub fn load_corpus(corpus_dir: &Path) -> Result<Vec<Document>> {
    if !corpus_dir.is_dir() {
        anyhow::bail!("Corpus directory {} does not exist", corpus_dir.display());
    }

    let mut files: Vec<_> = WalkDir::new(corpus_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|x| x.to_str())
                .map(|x| INDEXED_EXTENSIONS.contains(&x.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();

    let mut documents = Vec::new();
    for path in files {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };

        let is_html = matches!(
            path.extension().and_then(|x| x.to_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("html" | "htm")
        );
        let text = if is_html { strip_html(&raw) } else { raw };

        let source = path
            .strip_prefix(corpus_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        for chunk in chunk_paragraphs(&text) {
            documents.push(Document::new(chunk).with_metadata(SOURCE_KEY, source.clone()));
        }
    }

    Ok(documents)
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "li", "ul", "ol", "br", "h1", "h2", "h3", "h4",
    "h5", "h6", "tr", "table", "main", "nav", "blockquote", "pre", "title",
];

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Flatten HTML to text: entities are decoded by the parser, `<script>` and
/// `<style>` bodies and comments are dropped, block-level elements become
/// paragraph breaks.
pub fn strip_html(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::with_capacity(html.len() / 2);
    push_text(document.root_element(), &mut raw);

    raw.split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push_str("\n\n");
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            push_text(child_element, out);
        } else if let Node::Text(text) = child.value() {
            out.push_str(text);
        }
    }
    if block {
        out.push_str("\n\n");
    }
}

/// Split text at blank lines and merge paragraphs up to `CHAR_BUDGET`.
/// Paragraphs that alone exceed the budget are split at word boundaries.
pub fn chunk_paragraphs(text: &str) -> Vec<String> {
    let paragraphs: Vec<String> = text
        .split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.to_string())
        .collect();

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for para in paragraphs {
        let para_chars = visible_chars(&para);

        if para_chars > CHAR_BUDGET {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            split_large_paragraph(&para, &mut chunks);
            continue;
        }

        if !current.is_empty() && current_chars + para_chars > CHAR_BUDGET {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&para);
        current_chars += para_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn visible_chars(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

fn split_large_paragraph(para: &str, chunks: &mut Vec<String>) {
    let mut current = String::new();
    let mut chars = 0usize;

    for word in para.split_whitespace() {
        let word_chars = word.chars().count();
        if chars + word_chars > CHAR_BUDGET && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            chars = 0;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        chars += word_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
}
