use std::fmt::Write;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::llm::completion::{complete, sanitize_for_prompt};
use crate::models::Document;

/// Produces the final answer from a question and its supporting documents.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, documents: &[Document]) -> Result<String>;
}

pub struct LlmGenerator {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmGenerator {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl AnswerGenerator for LlmGenerator {
    async fn generate(&self, question: &str, documents: &[Document]) -> Result<String> {
        let prompt = build_answer_prompt(question, documents);
        let answer = complete(&self.client, &self.config, &prompt)
            .await
            .context("Answer generation call failed")?;
        Ok(answer.trim().to_string())
    }
}

fn build_answer_prompt(question: &str, documents: &[Document]) -> String {
    let question = sanitize_for_prompt(question);
    format!(
        "You are an assistant for question-answering tasks.\n\
         Use the following documents to answer the question.\n\
         If you don't know the answer, just say that you don't know.\n\
         Use four to five sentences maximum and keep the answer concise.\n\n\
         Question: {question}\n\n\
         Documents:\n{}\n\
         Answer:",
        render_documents(documents)
    )
}

fn render_documents(documents: &[Document]) -> String {
    if documents.is_empty() {
        return "(no documents)\n".to_string();
    }

    let mut out = String::new();
    for (i, doc) in documents.iter().enumerate() {
        let origin = doc.url().or_else(|| doc.source()).unwrap_or("site");
        // Writing to a String cannot fail.
        let _ = write!(
            out,
            "[{}] ({origin})\n{}\n\n",
            i + 1,
            sanitize_for_prompt(doc.content.trim())
        );
    }
    out
}
