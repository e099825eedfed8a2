use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key holding the source URL of a web-search result.
pub const URL_KEY: &str = "url";
/// Metadata key holding the corpus-relative path of an indexed chunk.
pub const SOURCE_KEY: &str = "source";

/// A piece of supporting text handed between pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.metadata.get(URL_KEY).map(String::as_str)
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// One hit returned by the web search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub content: String,
    pub url: String,
}

impl From<WebResult> for Document {
    fn from(r: WebResult) -> Self {
        Document::new(r.content).with_metadata(URL_KEY, r.url)
    }
}

/// Chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

/// Chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    /// Pipeline stages that produced the answer
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Contact-form submission (url-encoded form fields)
#[derive(Debug, Clone, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}
