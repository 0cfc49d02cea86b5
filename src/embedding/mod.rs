//! Embedding client abstraction, HTTP implementation, and retrying batch helpers.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("Unexpected embedding response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Provider returned no vector for a query text.
    #[error("Embedding provider returned no vectors for the query")]
    EmptyEmbedding,
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied text, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Default number of texts submitted per embedding request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 100;

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_MULTIPLIER_SECS: u64 = 2;
const BACKOFF_MIN_SECS: u64 = 1;
const BACKOFF_MAX_SECS: u64 = 10;

/// Embed a list of texts, batching requests and retrying each batch on failure.
///
/// Each batch is attempted up to 3 times with exponential backoff (multiplier 2, clamped
/// between 1s and 10s) before the whole operation fails. Output order matches input order.
pub async fn create_embeddings(
    client: &dyn EmbeddingClient,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batch_size.max(1);
    let mut all = Vec::with_capacity(texts.len());

    for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
        tracing::debug!(batch = batch_index, size = batch.len(), "Embedding batch");
        let vectors = embed_batch_with_retry(client, batch).await?;
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                actual: vectors.len(),
            });
        }
        all.extend(vectors);
    }

    tracing::info!(count = all.len(), "Generated embeddings");
    Ok(all)
}

/// Embed a single query text.
pub async fn embed_single(
    client: &dyn EmbeddingClient,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = create_embeddings(client, &[text.to_string()], 1).await?;
    vectors.pop().ok_or(EmbeddingError::EmptyEmbedding)
}

async fn embed_batch_with_retry(
    client: &dyn EmbeddingClient,
    batch: &[String],
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut attempt = 0;
    loop {
        match client.embed_batch(batch).await {
            Ok(vectors) => return Ok(vectors),
            Err(error) => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    tracing::error!(error = %error, attempts = attempt, "Embedding batch failed");
                    return Err(error);
                }
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    error = %error,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "Embedding batch failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let secs = BACKOFF_MULTIPLIER_SECS
        .saturating_mul(1u64 << (attempt.saturating_sub(1)))
        .clamp(BACKOFF_MIN_SECS, BACKOFF_MAX_SECS);
    Duration::from_secs(secs)
}

/// OpenAI-compatible embedding client over HTTP.
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Construct a client for the given endpoint and model.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().user_agent("checklist-rag/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({ "model": self.model, "input": texts }));
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::UnexpectedStatus { status, body });
        }

        let payload: EmbeddingResponse = response.json().await?;
        let mut data = payload.data;
        data.sort_by_key(|datum| datum.index);
        Ok(data.into_iter().map(|datum| datum.embedding).collect())
    }
}
