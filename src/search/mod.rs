pub mod ingest;
pub mod retriever;
pub mod vector;
