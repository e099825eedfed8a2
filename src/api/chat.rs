use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Backend;
use crate::models::{ChatRequest, ChatResponse};
use crate::pipeline::PipelineOutput;
use crate::state::{AppState, PipelineFactory};

const MAX_CHAT_MESSAGE_LEN: usize = 2000;
const GENERIC_FAILURE: &str = "Something went wrong while answering. Please try again later.";

/// POST /api/chat — answer a visitor question, served from cache when possible.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    // ── Step 1: Validate input ────────────────────────────
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Message is required".to_string()));
    }
    let message = truncate_to_char_boundary(message, MAX_CHAT_MESSAGE_LEN);

    // ── Step 2: Cache hits skip the semaphore ─────────────
    if let Some(hit) = state.cache.get(&message) {
        tracing::debug!("Served cached answer");
        return Ok(Json(ChatResponse {
            steps: hit.steps(),
            response: hit.answer,
        }));
    }

    // ── Step 3: Acquire semaphore ─────────────────────────
    let _permit = state.chat_semaphore.clone().try_acquire_owned().map_err(|_| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Chat service at capacity".to_string(),
        )
    })?;

    // ── Step 4: Run the pipeline ──────────────────────────
    // Re-checks the cache: another request may have answered since the lookup above.
    let span = tracing::info_span!("chat", request_id = %Uuid::new_v4());
    let output = state
        .cache
        .get_or_compute(&message, || answer_with_fallback(state.pipelines.as_ref(), &message))
        .instrument(span)
        .await
        .map_err(|e| {
            tracing::error!("Chat pipeline failed: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
        })?;

    Ok(Json(ChatResponse {
        steps: output.steps(),
        response: output.answer,
    }))
}

/// Run the pipeline on the primary backend; if that fails and a secondary
/// backend is configured, rebuild the pipeline on it and try exactly once more.
pub async fn answer_with_fallback(pipelines: &dyn PipelineFactory, question: &str) -> Result<PipelineOutput> {
    let primary = pipelines
        .build(Backend::Primary)
        .context("Primary LLM backend is not configured")?;

    let primary_err = match primary.run(question).await {
        Ok(output) => {
            tracing::info!("Answered via {:?}", output.steps());
            return Ok(output);
        }
        Err(e) => e,
    };

    let Some(secondary) = pipelines.build(Backend::Secondary) else {
        return Err(primary_err);
    };

    tracing::warn!("Primary backend failed, retrying once on secondary: {primary_err:#}");
    let output = secondary
        .run(question)
        .await
        .context("Secondary backend failed after primary failure")?;
    tracing::info!("Answered via secondary backend {:?}", output.steps());
    Ok(output)
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
