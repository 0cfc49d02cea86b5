//! Shared types for the vector index client and indexer.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid search service URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Search service responded with an unexpected status code.
    #[error("Unexpected search service response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the service.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// One embedded chunk as stored in the vector index.
///
/// Created at index time and never updated; queries always filter by `request_id` so
/// concurrent runs cannot cross-contaminate retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedDocument {
    /// Key assigned at index time (uuid4).
    pub id: String,
    /// Run identifier used as the partition/filter key.
    pub request_id: String,
    /// RFC3339 creation timestamp.
    pub created_at: String,
    /// Origin of the chunk, e.g. `"blob"`.
    pub source: String,
    /// Page the chunk came from.
    pub page_number: Option<u32>,
    /// Paragraph the chunk came from.
    pub paragraph_number: Option<u32>,
    /// Chunk text.
    pub text: String,
    /// Embedding vector (fixed dimension per collection).
    pub embeddings: Vec<f32>,
}

/// Per-document result of an upsert call.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    /// Document key.
    pub id: String,
    /// Whether the service accepted the document.
    pub succeeded: bool,
}

/// Metadata filter applied to similarity searches.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Equality constraint on `request_id`; scopes retrieval to one run.
    pub request_id: Option<String>,
    /// Optional equality constraint on `source`.
    pub source: Option<String>,
    /// Optional equality constraint on `page_number`.
    pub page_number: Option<u32>,
}

impl SearchFilter {
    /// Filter scoped to a single run.
    pub fn for_request(request_id: &str) -> Self {
        Self {
            request_id: Some(request_id.to_string()),
            ..Self::default()
        }
    }
}

/// A retrieved passage with its similarity score and provenance.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    /// Document key in the index.
    pub id: String,
    /// Similarity score reported by the index.
    pub score: f32,
    /// Stored chunk text.
    pub text: String,
    /// Page provenance, when stored.
    pub page_number: Option<u32>,
    /// Paragraph provenance, when stored.
    pub paragraph_number: Option<u32>,
    /// Origin of the chunk.
    pub source: Option<String>,
}

/// Interface implemented by vector index backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Ensure the backing collection and its filterable fields exist.
    async fn ensure_ready(&self) -> Result<(), IndexError>;

    /// Upsert a batch of documents, returning a per-document outcome.
    async fn upsert(
        &self,
        documents: &[IndexedDocument],
    ) -> Result<Vec<DocumentOutcome>, IndexError>;

    /// Nearest-neighbor search over stored embeddings.
    async fn search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: SearchFilter,
    ) -> Result<Vec<RetrievedPassage>, IndexError>;
}
