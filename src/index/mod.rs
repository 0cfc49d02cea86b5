//! Vector search index integration: REST client, document schema, and batch indexer.

pub mod client;
pub mod indexer;
pub mod types;

pub use client::SearchIndexService;
pub use indexer::{DEFAULT_INDEX_BATCH_SIZE, IndexReport, index_chunks};
pub use types::{
    DocumentOutcome, IndexError, IndexedDocument, RetrievedPassage, SearchFilter, VectorIndex,
};
