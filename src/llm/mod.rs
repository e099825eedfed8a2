pub mod completion;
pub mod embeddings;
pub mod generator;
pub mod grader;
pub mod web_search;
