#![deny(missing_docs)]

//! Core library for the checklist RAG answering pipeline.

/// Retrieval answering, batch scheduling, and result publishing.
pub mod answer;
/// Checklist block tree parsing and leaf grouping.
pub mod checklist;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and batched retry helpers.
pub mod embedding;
/// Vector search index integration.
pub mod index;
/// Extraction-artifact streaming and token-bounded chunking.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Run-level orchestration of ingestion and answering.
pub mod pipeline;
/// Blob storage abstraction and filesystem backend.
pub mod storage;
