//! Retrieval-augmented answer pipeline.
//!
//! ```text
//! Retrieve ──► Grade ──┬── any irrelevant ──► WebSearch ──► Generate ──► Done
//!                      └── all relevant ───────────────────► Generate ──► Done
//! ```
//!
//! Every stage is bounded by a timeout. Stage failures are returned to the
//! caller unchanged; the pipeline never retries on its own.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::generator::AnswerGenerator;
use crate::llm::grader::{Grade, RelevanceGrader};
use crate::llm::web_search::WebSearch;
use crate::models::Document;
use crate::search::retriever::Retriever;

/// Name of an executed pipeline stage, as recorded in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    RetrieveDocuments,
    GradeDocumentRetrieval,
    WebSearch,
    GenerateAnswer,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::RetrieveDocuments => "retrieve_documents",
            Step::GradeDocumentRetrieval => "grade_document_retrieval",
            Step::WebSearch => "web_search",
            Step::GenerateAnswer => "generate_answer",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record threaded through the stages of one run.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub question: String,
    pub documents: Vec<Document>,
    pub generation: Option<String>,
    pub needs_search: bool,
    trace: Vec<Step>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            documents: Vec::new(),
            generation: None,
            needs_search: false,
            trace: Vec::new(),
        }
    }

    /// Stages executed so far, in order. Only ever appended to.
    pub fn trace(&self) -> &[Step] {
        &self.trace
    }

    fn record(&mut self, step: Step) {
        self.trace.push(step);
    }
}

/// Final result of a pipeline run; also the payload stored in the response cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub answer: String,
    pub trace: Vec<Step>,
}

impl PipelineOutput {
    pub fn steps(&self) -> Vec<String> {
        self.trace.iter().map(|s| s.as_str().to_string()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Retrieve,
    Grade,
    WebSearch,
    Generate,
    Done,
}

/// One pipeline bound to a single set of collaborators. Cheap to build per request.
#[derive(Clone)]
pub struct Pipeline {
    retriever: Arc<dyn Retriever>,
    grader: Arc<dyn RelevanceGrader>,
    web_search: Arc<dyn WebSearch>,
    generator: Arc<dyn AnswerGenerator>,
    stage_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        grader: Arc<dyn RelevanceGrader>,
        web_search: Arc<dyn WebSearch>,
        generator: Arc<dyn AnswerGenerator>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            retriever,
            grader,
            web_search,
            generator,
            stage_timeout,
        }
    }

    /// Answer `question`, returning the answer and the stages that produced it.
    pub async fn run(&self, question: &str) -> Result<PipelineOutput> {
        let state = self.run_to_completion(question).await?;
        let answer = state
            .generation
            .context("Pipeline finished without generating an answer")?;
        Ok(PipelineOutput {
            answer,
            trace: state.trace,
        })
    }

    /// Drive the state machine and return the final state.
    pub async fn run_to_completion(&self, question: &str) -> Result<PipelineState> {
        let mut state = PipelineState::new(question);
        let mut stage = Stage::Retrieve;

        while stage != Stage::Done {
            stage = match stage {
                Stage::Retrieve => {
                    self.retrieve(&mut state).await?;
                    Stage::Grade
                }
                Stage::Grade => {
                    self.grade(&mut state).await?;
                    decide_next(&state)
                }
                Stage::WebSearch => {
                    self.web_search(&mut state).await?;
                    Stage::Generate
                }
                Stage::Generate => {
                    self.generate(&mut state).await?;
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
        }

        Ok(state)
    }

    async fn retrieve(&self, state: &mut PipelineState) -> Result<()> {
        let documents = self
            .bounded(Step::RetrieveDocuments, self.retriever.retrieve(&state.question))
            .await?;
        tracing::debug!("Retrieved {} documents", documents.len());
        state.documents = documents;
        state.record(Step::RetrieveDocuments);
        Ok(())
    }

    async fn grade(&self, state: &mut PipelineState) -> Result<()> {
        let candidates = std::mem::take(&mut state.documents);
        let mut kept = Vec::with_capacity(candidates.len());
        let mut needs_search = false;

        for doc in candidates {
            let grade = self
                .bounded(
                    Step::GradeDocumentRetrieval,
                    self.grader.grade(&state.question, &doc.content),
                )
                .await?;
            match grade {
                Grade::Relevant => kept.push(doc),
                Grade::NotRelevant => needs_search = true,
            }
        }

        tracing::debug!("Kept {} documents after grading, web search: {needs_search}", kept.len());
        state.documents = kept;
        state.needs_search = needs_search;
        state.record(Step::GradeDocumentRetrieval);
        Ok(())
    }

    async fn web_search(&self, state: &mut PipelineState) -> Result<()> {
        let results = self
            .bounded(Step::WebSearch, self.web_search.search(&state.question))
            .await?;
        tracing::debug!("Web search returned {} results", results.len());
        state.documents.extend(results.into_iter().map(Document::from));
        state.record(Step::WebSearch);
        Ok(())
    }

    async fn generate(&self, state: &mut PipelineState) -> Result<()> {
        let answer = self
            .bounded(
                Step::GenerateAnswer,
                self.generator.generate(&state.question, &state.documents),
            )
            .await?;
        state.generation = Some(answer);
        state.record(Step::GenerateAnswer);
        Ok(())
    }

    async fn bounded<T>(&self, step: Step, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.stage_timeout, fut).await {
            Ok(result) => result.with_context(|| format!("Stage {step} failed")),
            Err(_) => anyhow::bail!("Stage {step} timed out after {:?}", self.stage_timeout),
        }
    }
}

/// Conditional edge after grading.
fn decide_next(state: &PipelineState) -> Stage {
    if state.needs_search {
        Stage::WebSearch
    } else {
        Stage::Generate
    }
}
