use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the response cache and vector store are kept
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// Primary text-completion backend
    pub llm: LlmConfig,
    /// Optional secondary backend used once when the primary pipeline fails
    pub fallback_llm: Option<LlmConfig>,
    /// Embedding provider for the vector store
    pub embedding: EmbeddingConfig,
    pub retriever: RetrieverConfig,
    pub web_search: WebSearchConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub mail: MailConfig,
    /// Directory of site pages to index into the vector store
    pub corpus_dir: Option<PathBuf>,
    /// Rebuild the vector store from `corpus_dir` on start-up even if it is populated
    pub recreate_index: bool,
    /// Upper bound for any single pipeline stage, in seconds
    pub stage_timeout_secs: u64,
}

/// Which configured completion backend a pipeline is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai" (any OpenAI-compatible API, e.g. Groq)
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    pub chat_model: String,
    /// API key (only needed for cloud providers)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    /// None lets the provider decide
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    /// Extra attempts after the first failed call
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "openai"
    pub provider: String,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Maximum number of candidates returned per query
    pub top_k: usize,
    /// Minimum cosine similarity a candidate must reach
    pub score_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    /// Tavily-compatible search API
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_results: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached answers
    pub capacity: usize,
    /// Discard the persisted cache on start-up
    pub reset: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// HTTP endpoint of the mail relay. Messages are only logged when unset.
    pub relay_url: Option<String>,
    #[serde(skip_serializing)]
    pub relay_token: Option<String>,
    /// Inbox that receives contact-form messages
    pub to_address: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            fallback_llm: None,
            embedding: EmbeddingConfig::default(),
            retriever: RetrieverConfig::default(),
            web_search: WebSearchConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            mail: MailConfig::default(),
            corpus_dir: None,
            recreate_index: false,
            stage_timeout_secs: 60,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.1:8b".to_string(),
            api_key: None,
            temperature: 0.0,
            max_tokens: None,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

impl LlmConfig {
    /// Defaults for the secondary backend: warmer sampling and short answers.
    fn fallback_defaults() -> Self {
        Self {
            chat_model: "mistral:7b-instruct".to_string(),
            temperature: 0.5,
            max_tokens: Some(128),
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "bge-large".to_string(),
            api_key: None,
            dim: 1024,
        }
    }
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            score_threshold: 0.1,
        }
    }
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: None,
            max_results: 5,
            timeout_secs: 20,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 20,
            reset: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 60,
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            relay_token: None,
            to_address: "owner@localhost".to_string(),
            timeout_secs: 15,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

impl Config {
    /// Build the configuration from `Config::default()` overlaid with environment
    /// variables. A `.env` file in the working directory is honoured.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Some(dir) = env_string("SITE_CHAT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(addr) = env_string("SITE_CHAT_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(dir) = env_string("SITE_CHAT_CORPUS_DIR") {
            config.corpus_dir = Some(PathBuf::from(dir));
        }
        if let Some(v) = env_flag("SITE_CHAT_RECREATE_INDEX") {
            config.recreate_index = v;
        }
        if let Some(v) = env_parse("PIPELINE_STAGE_TIMEOUT_SECS") {
            config.stage_timeout_secs = v;
        }

        apply_llm_env(&mut config.llm, "LLM");
        if env_string("FALLBACK_LLM_PROVIDER").is_some() || env_string("FALLBACK_LLM_BASE_URL").is_some() {
            let mut fallback = LlmConfig::fallback_defaults();
            apply_llm_env(&mut fallback, "FALLBACK_LLM");
            config.fallback_llm = Some(fallback);
        }

        if let Some(provider) = env_string("EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }
        if let Some(url) = env_string("EMBEDDING_BASE_URL") {
            config.embedding.base_url = url;
        }
        if let Some(model) = env_string("EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(key) = env_string("EMBEDDING_API_KEY") {
            config.embedding.api_key = Some(key);
        }
        if let Some(dim) = env_parse("EMBEDDING_DIM") {
            config.embedding.dim = dim;
        }

        if let Some(v) = env_parse("RETRIEVER_TOP_K") {
            config.retriever.top_k = v;
        }
        if let Some(v) = env_parse("RETRIEVER_SCORE_THRESHOLD") {
            config.retriever.score_threshold = v;
        }

        if let Some(url) = env_string("WEB_SEARCH_BASE_URL") {
            config.web_search.base_url = url;
        }
        if let Some(key) = env_string("TAVILY_API_KEY") {
            config.web_search.api_key = Some(key);
        }
        if let Some(v) = env_parse("WEB_SEARCH_MAX_RESULTS") {
            config.web_search.max_results = v;
        }
        if let Some(v) = env_parse::<u64>("WEB_SEARCH_TIMEOUT_SECS") {
            config.web_search.timeout_secs = v.min(60);
        }

        if let Some(v) = env_parse("CACHE_CAPACITY") {
            config.cache.capacity = v;
        }
        if let Some(v) = env_flag("CACHE_RESET") {
            config.cache.reset = v;
        }

        if let Some(v) = env_parse("CONTACT_MAX_REQUESTS") {
            config.rate_limit.max_requests = v;
        }
        if let Some(v) = env_parse("CONTACT_WINDOW_SECS") {
            config.rate_limit.window_secs = v;
        }

        if let Some(url) = env_string("MAIL_RELAY_URL") {
            config.mail.relay_url = Some(url);
        }
        if let Some(token) = env_string("MAIL_RELAY_TOKEN") {
            config.mail.relay_token = Some(token);
        }
        if let Some(to) = env_string("MAIL_TO") {
            config.mail.to_address = to;
        }

        config
    }

    /// Completion settings for the given backend, if it is configured.
    pub fn llm_for(&self, backend: Backend) -> Option<&LlmConfig> {
        match backend {
            Backend::Primary => Some(&self.llm),
            Backend::Secondary => self.fallback_llm.as_ref(),
        }
    }

    pub fn vector_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("chat_cache.json")
    }
}

fn apply_llm_env(llm: &mut LlmConfig, prefix: &str) {
    if let Some(provider) = env_string(&format!("{prefix}_PROVIDER")) {
        llm.provider = provider;
    }
    if let Some(url) = env_string(&format!("{prefix}_BASE_URL")) {
        llm.base_url = url;
    }
    if let Some(model) = env_string(&format!("{prefix}_CHAT_MODEL")) {
        llm.chat_model = model;
    }
    if let Some(key) = env_string(&format!("{prefix}_API_KEY")) {
        llm.api_key = Some(key);
    }
    if let Some(v) = env_parse(&format!("{prefix}_TEMPERATURE")) {
        llm.temperature = v;
    }
    if let Some(v) = env_parse(&format!("{prefix}_MAX_TOKENS")) {
        llm.max_tokens = Some(v);
    }
    if let Some(v) = env_parse(&format!("{prefix}_TIMEOUT_SECS")) {
        llm.timeout_secs = v;
    }
    if let Some(v) = env_parse(&format!("{prefix}_MAX_RETRIES")) {
        llm.max_retries = v;
    }
}
