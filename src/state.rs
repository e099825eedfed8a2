use std::sync::Arc;
use std::time::Duration;

use crate::cache::ResponseCache;
use crate::config::{Backend, Config};
use crate::llm::generator::LlmGenerator;
use crate::llm::grader::LlmGrader;
use crate::llm::web_search::{TavilySearch, WebSearch};
use crate::mail::{relay_from_config, MailRelay};
use crate::pipeline::{Pipeline, PipelineOutput};
use crate::rate_limit::RateLimiter;
use crate::search::ingest::index_corpus;
use crate::search::retriever::{Retriever, VectorRetriever};
use crate::search::vector::VectorStore;

/// Builds a pipeline bound to one completion backend.
pub trait PipelineFactory: Send + Sync {
    /// `None` when the backend is not configured.
    fn build(&self, backend: Backend) -> Option<Pipeline>;
}

/// Production factory: shared retriever and web search, grader and generator
/// bound to the requested backend's LLM settings.
pub struct LlmPipelineFactory {
    config: Config,
    client: reqwest::Client,
    retriever: Arc<dyn Retriever>,
    web_search: Arc<dyn WebSearch>,
}

impl LlmPipelineFactory {
    pub fn new(config: Config, client: reqwest::Client, store: Arc<VectorStore>) -> Self {
        let retriever: Arc<dyn Retriever> = Arc::new(VectorRetriever::new(
            client.clone(),
            config.embedding.clone(),
            store,
            &config.retriever,
        ));
        let web_search: Arc<dyn WebSearch> =
            Arc::new(TavilySearch::new(client.clone(), config.web_search.clone()));

        Self {
            config,
            client,
            retriever,
            web_search,
        }
    }
}

impl PipelineFactory for LlmPipelineFactory {
    fn build(&self, backend: Backend) -> Option<Pipeline> {
        let llm = self.config.llm_for(backend)?;
        Some(Pipeline::new(
            self.retriever.clone(),
            Arc::new(LlmGrader::new(self.client.clone(), llm.clone())),
            self.web_search.clone(),
            Arc::new(LlmGenerator::new(self.client.clone(), llm.clone())),
            Duration::from_secs(self.config.stage_timeout_secs),
        ))
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipelines: Arc<dyn PipelineFactory>,
    pub cache: Arc<ResponseCache<PipelineOutput>>,
    pub contact_limiter: Arc<RateLimiter>,
    pub mailer: Arc<dyn MailRelay>,
    pub chat_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    /// Open the vector store, index the corpus when needed and wire up the
    /// production collaborators.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;

        let store = Arc::new(VectorStore::open_or_create(&config.vector_dir())?);
        if let Some(corpus_dir) = &config.corpus_dir {
            if config.recreate_index || store.is_empty() {
                index_corpus(&http_client, &config.embedding, &store, corpus_dir).await?;
            }
        }
        if store.is_empty() {
            tracing::warn!("Vector store is empty; answers will come from the model and web search only");
        } else {
            tracing::info!("Vector store holds {} chunks", store.entry_count());
        }

        let pipelines = Arc::new(LlmPipelineFactory::new(config.clone(), http_client.clone(), store));
        let mailer = relay_from_config(http_client, &config.mail);

        Ok(Self::with_services(config, pipelines, mailer))
    }

    /// Assemble state around caller-supplied pipeline and mail collaborators.
    pub fn with_services(
        config: Config,
        pipelines: Arc<dyn PipelineFactory>,
        mailer: Arc<dyn MailRelay>,
    ) -> Self {
        let cache = ResponseCache::new(config.cache_path(), config.cache.capacity, config.cache.reset);
        let contact_limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_secs(config.rate_limit.window_secs),
        );

        Self {
            config,
            pipelines,
            cache: Arc::new(cache),
            contact_limiter: Arc::new(contact_limiter),
            mailer,
            chat_semaphore: Arc::new(tokio::sync::Semaphore::new(3)),
        }
    }
}
