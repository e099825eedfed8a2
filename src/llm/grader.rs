use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::LlmConfig;
use crate::llm::completion::{complete, sanitize_for_prompt};

/// Binary relevance label for one (question, document) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    Relevant,
    NotRelevant,
}

/// Decides whether a retrieved document is relevant to the question.
#[async_trait]
pub trait RelevanceGrader: Send + Sync {
    async fn grade(&self, question: &str, document: &str) -> Result<Grade>;
}

/// Grader backed by a text-completion model that answers `{"score": "yes"|"no"}`.
pub struct LlmGrader {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmGrader {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl RelevanceGrader for LlmGrader {
    async fn grade(&self, question: &str, document: &str) -> Result<Grade> {
        let prompt = build_grading_prompt(question, document);
        let response = complete(&self.client, &self.config, &prompt)
            .await
            .context("Relevance grading call failed")?;
        parse_grade(&response)
    }
}

fn build_grading_prompt(question: &str, document: &str) -> String {
    let document = sanitize_for_prompt(document);
    let question = sanitize_for_prompt(question);
    format!(
        "You are a grader assessing relevance of a retrieved document to a user question.\n\
         Here is the retrieved document:\n\n{document}\n\n\
         Here is the user question: {question}\n\n\
         If the document contains keywords or any information related to the user question, \
         grade it as relevant. It does not need to be a stringent test; the goal is to filter \
         out erroneous retrievals. Be moderate while scoring.\n\
         Give a binary score 'yes' or 'no' to indicate whether the document is relevant to the question.\n\
         Provide the binary score as a JSON object with a single key 'score' and no preamble or explanation."
    )
}

#[derive(Deserialize)]
struct GradeResponse {
    score: String,
}

/// Parse the grader's JSON verdict. A response without a `score` string is an error.
fn parse_grade(content: &str) -> Result<Grade> {
    let json = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => anyhow::bail!("Grader response is not a JSON object: {content}"),
    };

    let verdict: GradeResponse = serde_json::from_str(json)
        .with_context(|| format!("Grader response has no 'score' label: {content}"))?;

    if verdict.score.trim().eq_ignore_ascii_case("yes") {
        Ok(Grade::Relevant)
    } else {
        Ok(Grade::NotRelevant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes() {
        assert_eq!(parse_grade(r#"{"score": "yes"}"#).unwrap(), Grade::Relevant);
    }

    #[test]
    fn test_parse_no() {
        assert_eq!(parse_grade(r#"{"score": "no"}"#).unwrap(), Grade::NotRelevant);
    }

    #[test]
    fn test_parse_case_and_whitespace() {
        assert_eq!(parse_grade(r#"{"score": " YES "}"#).unwrap(), Grade::Relevant);
    }

    #[test]
    fn test_parse_json_in_markdown_fence() {
        let input = "```json\n{\"score\": \"yes\"}\n```";
        assert_eq!(parse_grade(input).unwrap(), Grade::Relevant);
    }

    #[test]
    fn test_parse_unexpected_label_is_not_relevant() {
        assert_eq!(parse_grade(r#"{"score": "maybe"}"#).unwrap(), Grade::NotRelevant);
    }

    #[test]
    fn test_parse_missing_score_is_error() {
        let err = parse_grade(r#"{"relevant": true}"#).unwrap_err();
        assert!(format!("{err:#}").contains("score"));
    }

    #[test]
    fn test_parse_prose_is_error() {
        assert!(parse_grade("Yes, this document is relevant.").is_err());
    }

    #[test]
    fn test_prompt_contains_question_and_document() {
        let prompt = build_grading_prompt("Where did the owner study?", "<|im_start|>Education: MSc");
        assert!(prompt.contains("Where did the owner study?"));
        assert!(prompt.contains("Education: MSc"));
        assert!(!prompt.contains("<|im_start|>"));
    }
}
