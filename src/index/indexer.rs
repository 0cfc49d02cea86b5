//! Concurrent batch indexing of embedded chunks with a single retry pass.

use futures_util::future::join_all;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::ingest::ChunkRecord;

use super::types::{IndexedDocument, VectorIndex};

/// Default number of documents sent per upsert call.
pub const DEFAULT_INDEX_BATCH_SIZE: usize = 100;

/// Aggregated outcome of indexing one run's chunks, counted per document.
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    /// Total number of chunks submitted for indexing.
    pub total: usize,
    /// Documents accepted by the index, including those recovered by the retry pass.
    pub succeeded: usize,
    /// Documents the index never accepted.
    pub failed: usize,
    /// Batch positions that still failed after the retry pass.
    pub failed_batches: Vec<usize>,
}

/// Upsert embedded chunks into the vector index in concurrent fixed-size batches.
///
/// All batches are dispatched concurrently; batches that fail are retried exactly once in a
/// second concurrent pass with no additional backoff. Batches that fail the retry remain
/// failed and are surfaced in the report rather than dropped. Chunks missing an embedding
/// are counted as failed without being submitted.
pub async fn index_chunks(
    index: &dyn VectorIndex,
    chunks: &[ChunkRecord],
    request_id: &str,
    batch_size: usize,
) -> IndexReport {
    let created_at = current_timestamp_rfc3339();
    let mut documents = Vec::with_capacity(chunks.len());
    let mut missing_embeddings = 0;

    for chunk in chunks {
        match &chunk.embedding {
            Some(embedding) => documents.push(IndexedDocument {
                id: Uuid::new_v4().to_string(),
                request_id: request_id.to_string(),
                created_at: created_at.clone(),
                source: "blob".to_string(),
                page_number: chunk.page_number,
                paragraph_number: chunk.paragraph_number,
                text: chunk.text.clone(),
                embeddings: embedding.clone(),
            }),
            None => {
                tracing::warn!(
                    page = ?chunk.page_number,
                    chunk_index = chunk.chunk_index,
                    "Chunk has no embedding; skipping"
                );
                missing_embeddings += 1;
            }
        }
    }

    let batch_size = batch_size.max(1);
    let batches: Vec<&[IndexedDocument]> = documents.chunks(batch_size).collect();
    tracing::info!(
        request_id,
        chunks = documents.len(),
        batches = batches.len(),
        "Indexing chunks"
    );

    let mut succeeded = 0;
    let mut failed_batches = Vec::new();

    let first_pass = join_all(batches.iter().enumerate().map(|(position, batch)| async move {
        (position, index.upsert(batch).await)
    }))
    .await;

    for (position, result) in first_pass {
        match result {
            Ok(outcomes) => {
                succeeded += outcomes.iter().filter(|outcome| outcome.succeeded).count();
            }
            Err(error) => {
                tracing::warn!(batch = position, error = %error, "Batch upsert failed");
                failed_batches.push(position);
            }
        }
    }

    // Exactly one retry pass over the failed batches, again fully concurrent.
    let mut unrecovered = Vec::new();
    if !failed_batches.is_empty() {
        tracing::info!(batches = failed_batches.len(), "Retrying failed batches once");
        let retry_pass = join_all(failed_batches.iter().map(|&position| {
            let batch = batches[position];
            async move { (position, index.upsert(batch).await) }
        }))
        .await;

        for (position, result) in retry_pass {
            match result {
                Ok(outcomes) => {
                    succeeded += outcomes.iter().filter(|outcome| outcome.succeeded).count();
                }
                Err(error) => {
                    tracing::error!(batch = position, error = %error, "Batch upsert failed after retry");
                    unrecovered.push(position);
                }
            }
        }
    }

    let total = chunks.len();
    let report = IndexReport {
        total,
        succeeded,
        failed: total - succeeded,
        failed_batches: unrecovered,
    };
    tracing::info!(
        request_id,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = missing_embeddings,
        "Indexing completed"
    );
    report
}

/// Current timestamp formatted for document storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{DocumentOutcome, IndexError, RetrievedPassage, SearchFilter};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedIndex {
        calls: AtomicUsize,
        failures: usize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedIndex {
        fn failing_first(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn ensure_ready(&self) -> Result<(), IndexError> {
            Ok(())
        }

        async fn upsert(
            &self,
            documents: &[IndexedDocument],
        ) -> Result<Vec<DocumentOutcome>, IndexError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.batch_sizes.lock().unwrap().push(documents.len());
            if call < self.failures {
                return Err(IndexError::UnexpectedStatus {
                    status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    body: "busy".into(),
                });
            }
            Ok(documents
                .iter()
                .map(|doc| DocumentOutcome {
                    id: doc.id.clone(),
                    succeeded: true,
                })
                .collect())
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            _k: usize,
            _filter: SearchFilter,
        ) -> Result<Vec<RetrievedPassage>, IndexError> {
            Ok(Vec::new())
        }
    }

    fn embedded_chunk(index: usize) -> ChunkRecord {
        ChunkRecord {
            page_number: Some(1),
            paragraph_number: Some(1),
            chunk_index: index,
            text: format!("chunk {index}"),
            token_count: 2,
            embedding: Some(vec![0.1, 0.2]),
        }
    }

    #[tokio::test]
    async fn retry_pass_recovers_failed_first_upsert() {
        let index = ScriptedIndex::failing_first(1);
        let chunks: Vec<ChunkRecord> = (0..3).map(embedded_chunk).collect();
        let report = index_chunks(&index, &chunks, "req-1", 100).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert!(report.failed_batches.is_empty());
        assert_eq!(index.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unrecovered_batches_stay_failed_and_surface() {
        let index = ScriptedIndex::failing_first(usize::MAX);
        let chunks: Vec<ChunkRecord> = (0..5).map(embedded_chunk).collect();
        let report = index_chunks(&index, &chunks, "req-1", 2).await;

        assert_eq!(report.total, 5);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 5);
        assert_eq!(report.failed_batches.len(), 3);
        // 3 first-pass batches + 3 retries, never a third attempt.
        assert_eq!(index.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn partitions_into_fixed_size_batches() {
        let index = ScriptedIndex::failing_first(0);
        let chunks: Vec<ChunkRecord> = (0..7).map(embedded_chunk).collect();
        let report = index_chunks(&index, &chunks, "req-1", 3).await;

        assert_eq!(report.succeeded, 7);
        let mut sizes = index.batch_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3, 3]);
    }

    #[tokio::test]
    async fn chunks_without_embeddings_count_as_failed() {
        let index = ScriptedIndex::failing_first(0);
        let mut chunks: Vec<ChunkRecord> = (0..2).map(embedded_chunk).collect();
        chunks.push(ChunkRecord {
            embedding: None,
            ..embedded_chunk(2)
        });
        let report = index_chunks(&index, &chunks, "req-1", 100).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
