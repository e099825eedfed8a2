//! # site-chat
//!
//! Backend for a personal website: serves the homepage, relays contact-form
//! messages, and answers visitor questions with a retrieval-augmented chat
//! assistant.
//!
//! ## Architecture
//!
//! The chat pipeline is a small directed graph with one conditional branch:
//!
//! ```text
//!                   ┌────────────────┐
//!                   │ POST /api/chat │
//!                   └───────┬────────┘
//!                            ▼
//!                 ┌─────────────────────┐   hit
//!                 │  LRU response cache │──────────► response
//!                 └──────────┬──────────┘
//!                            │ miss
//!                            ▼
//!                 ┌─────────────────────┐
//!                 │ retrieve_documents  │  top-3, similarity ≥ 0.1
//!                 └──────────┬──────────┘
//!                            ▼
//!                 ┌─────────────────────────┐
//!                 │ grade_document_retrieval │  yes/no per document
//!                 └──────────┬──────────────┘
//!                 any "no"?  │
//!              ┌─────────────┴─────────────┐
//!              ▼ yes                       ▼ no
//!      ┌──────────────┐                    │
//!      │  web_search  │ append results     │
//!      └──────┬───────┘                    │
//!             └─────────────┬──────────────┘
//!                           ▼
//!                 ┌─────────────────────┐
//!                 │   generate_answer   │
//!                 └──────────┬──────────┘
//!                            ▼
//!                  cache insert + response
//! ```
//!
//! If the primary LLM backend fails, the chat handler rebuilds the pipeline
//! on the secondary backend and runs it once more.
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, LLM backends, cache and limits
//! - [`models`] - Shared data types: `Document`, request/response types
//! - [`pipeline`] - The retrieve → grade → (web search) → generate state machine
//! - [`cache`] - Bounded LRU response cache persisted to a JSON file
//! - [`rate_limit`] - Per-client sliding-window limiter for the contact form
//! - [`search::vector`] - In-memory vector store with cosine similarity and disk persistence
//! - [`search::retriever`] - Query embedding + thresholded nearest-neighbour retrieval
//! - [`search::ingest`] - Corpus walking, chunking and embedding at start-up
//! - [`llm`] - Completion and embedding clients, relevance grader, answer generator, web search
//! - [`mail`] - Contact message relay
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state and per-backend pipeline construction

pub mod api;
pub mod cache;
pub mod config;
pub mod llm;
pub mod mail;
pub mod models;
pub mod pipeline;
pub mod rate_limit;
pub mod search;
pub mod state;
