use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Maximum characters sent per text. Site chunks are prose, so 4 000 chars
/// stays well inside the 512-token window of bge-style models after the
/// provider's own truncation.
const MAX_EMBED_CHARS: usize = 4_000;

fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Texts per provider request.
const BATCH_SIZE: usize = 32;

/// Embed site chunks (or a query) with the configured provider, one vector per
/// input, in input order.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(BATCH_SIZE) {
        let inputs: Vec<&str> = batch.iter().map(|t| truncate_for_embedding(t)).collect();
        let batch_vectors = match config.provider.as_str() {
            "ollama" => embed_ollama(client, config, inputs).await?,
            "openai" => embed_openai(client, config, inputs).await?,
            other => anyhow::bail!("Unknown embedding provider: {other}"),
        };
        if batch_vectors.len() != batch.len() {
            anyhow::bail!(
                "Embedding provider returned {} vectors for {} inputs",
                batch_vectors.len(),
                batch.len()
            );
        }
        vectors.extend(batch_vectors);
    }
    Ok(vectors)
}

/// Embed a single visitor query.
pub async fn embed_single(client: &reqwest::Client, config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    embed_batch(client, config, &[text.to_string()])
        .await?
        .pop()
        .context("No embedding returned")
}

async fn post_embed<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    request: reqwest::RequestBuilder,
    body: &Req,
    provider: &str,
) -> Result<Resp> {
    let resp = request
        .json(body)
        .send()
        .await
        .with_context(|| format!("Failed to call {provider} embed API"))?;

    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("{provider} embed API returned {status}: {text}");
    }

    resp.json()
        .await
        .with_context(|| format!("Failed to parse {provider} embed response"))
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn embed_ollama(client: &reqwest::Client, config: &EmbeddingConfig, input: Vec<&str>) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));
    let req = OllamaEmbedRequest {
        model: &config.model,
        input,
        truncate: true,
    };
    let body: OllamaEmbedResponse = post_embed(client.post(url), &req, "Ollama").await?;
    Ok(body.embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    embedding: Vec<f32>,
}

async fn embed_openai(client: &reqwest::Client, config: &EmbeddingConfig, input: Vec<&str>) -> Result<Vec<Vec<f32>>> {
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let mut request = client.post(url);
    if let Some(key) = &config.api_key {
        request = request.bearer_auth(key);
    }
    let req = OpenAiEmbedRequest {
        model: &config.model,
        input,
    };
    let body: OpenAiEmbedResponse = post_embed(request, &req, "OpenAI").await?;
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}
