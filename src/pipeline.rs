//! High-level orchestration of the ingestion and answering runs.

use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;

use crate::answer::{
    ChatModel, DEFAULT_ANSWER_BATCH_SIZE, DEFAULT_ANSWER_MAX_WORKERS, PublishError,
    RetrievalAnswerer, RunProgress, process_all, publish,
};
use crate::checklist::{Block, ChecklistDocument, ChecklistError, group_leaves};
use crate::config::Config;
use crate::embedding::{
    DEFAULT_EMBEDDING_BATCH_SIZE, EmbeddingClient, EmbeddingError, create_embeddings,
};
use crate::index::{DEFAULT_INDEX_BATCH_SIZE, IndexError, VectorIndex, index_chunks};
use crate::ingest::{
    ChunkingError, DEFAULT_CHUNK_MAX_TOKENS, DEFAULT_CHUNK_OVERLAP_WORDS, DocumentEntry,
    IngestError, chunk_documents, stream_entries,
};
use crate::storage::{BlobStore, StorageError};

/// Errors that abort a pipeline run.
///
/// Per-leaf answering failures never appear here; they are demoted to a status field on the
/// affected leaf by the scheduler.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Blob storage access failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Checklist document failed to parse or validate.
    #[error(transparent)]
    Checklist(#[from] ChecklistError),
    /// Streaming extraction of the source document failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// Chunking configuration or tokenizer setup failed.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Embedding the chunks failed after retries.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Vector index was unreachable or rejected a request.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Final artifact write failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Tunables for one pipeline instance, resolved from configuration with defaults applied.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Embedding model identifier, also used to resolve the tokenizer.
    pub embedding_model: String,
    /// Token budget per chunk.
    pub chunk_max_tokens: usize,
    /// Words of overlap between adjacent chunks.
    pub chunk_overlap_words: usize,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
    /// Documents per index upsert call.
    pub index_batch_size: usize,
    /// Leaves answered per sequential batch.
    pub answer_batch_size: usize,
    /// Concurrent in-flight answer calls within a batch.
    pub answer_max_workers: usize,
    /// Optional cap on sibling group size.
    pub max_group_size: Option<usize>,
    /// Passages retrieved per question.
    pub retrieval_top_k: Option<usize>,
    /// Override for the answering system prompt.
    pub system_prompt: Option<String>,
    /// Override for the answering user prompt.
    pub user_prompt: Option<String>,
}

impl PipelineSettings {
    /// Resolve settings from loaded configuration, filling gaps with defaults.
    pub fn from_config(config: &Config) -> Self {
        Self {
            embedding_model: config.embedding_model.clone(),
            chunk_max_tokens: config.chunk_max_tokens.unwrap_or(DEFAULT_CHUNK_MAX_TOKENS),
            chunk_overlap_words: config
                .chunk_overlap_words
                .unwrap_or(DEFAULT_CHUNK_OVERLAP_WORDS),
            embedding_batch_size: config
                .embedding_batch_size
                .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE),
            index_batch_size: DEFAULT_INDEX_BATCH_SIZE,
            answer_batch_size: config.answer_batch_size.unwrap_or(DEFAULT_ANSWER_BATCH_SIZE),
            answer_max_workers: config
                .answer_max_workers
                .unwrap_or(DEFAULT_ANSWER_MAX_WORKERS),
            max_group_size: config.max_group_size,
            retrieval_top_k: config.retrieval_top_k,
            system_prompt: config.system_prompt.clone(),
            user_prompt: config.user_prompt.clone(),
        }
    }
}

/// Counts reported after an ingestion run.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Paragraph entries streamed from the extraction artifact.
    pub entries: usize,
    /// Chunks produced from those entries.
    pub chunks: usize,
    /// Chunks accepted by the vector index.
    pub indexed: usize,
    /// Chunks the index never accepted.
    pub failed: usize,
}

/// Counts and artifact location reported after an answering run.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Leaves extracted from the checklist.
    pub leaves: usize,
    /// Leaves answered successfully.
    pub processed: u64,
    /// Leaves whose answering attempt failed.
    pub failed: u64,
    /// Blob path of the published answer artifact.
    pub artifact_path: String,
}

/// Pipeline facade owning the external collaborators behind trait objects.
pub struct ChecklistService {
    blob_store: Arc<dyn BlobStore>,
    embedding: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatModel>,
    settings: PipelineSettings,
}

impl ChecklistService {
    /// Assemble a service from its collaborators and settings.
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        embedding: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            blob_store,
            embedding,
            index,
            chat,
            settings,
        }
    }

    /// Ingest the extraction artifact `{request_id}.json`: stream, chunk, embed, index.
    pub async fn ingest_document(&self, request_id: &str) -> Result<IngestOutcome, PipelineError> {
        self.index.ensure_ready().await?;

        let source = self
            .blob_store
            .read_stream(&format!("{request_id}.json"))
            .await?;
        let entry_stream = stream_entries(source);
        tokio::pin!(entry_stream);

        let mut entries: Vec<DocumentEntry> = Vec::new();
        while let Some(entry) = entry_stream.next().await {
            entries.push(entry?);
        }
        tracing::info!(request_id, entries = entries.len(), "Streamed document entries");

        let mut chunks = chunk_documents(
            &entries,
            self.settings.chunk_max_tokens,
            self.settings.chunk_overlap_words,
            &self.settings.embedding_model,
        )?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = create_embeddings(
            self.embedding.as_ref(),
            &texts,
            self.settings.embedding_batch_size,
        )
        .await?;
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }

        let report = index_chunks(
            self.index.as_ref(),
            &chunks,
            request_id,
            self.settings.index_batch_size,
        )
        .await;

        Ok(IngestOutcome {
            entries: entries.len(),
            chunks: chunks.len(),
            indexed: report.succeeded,
            failed: report.failed,
        })
    }

    /// Answer a checklist: parse, group, schedule, publish.
    pub async fn answer_checklist(
        &self,
        request_id: &str,
        checklist_path: &str,
    ) -> Result<AnswerOutcome, PipelineError> {
        let bytes = self.blob_store.read_bytes(checklist_path).await?;
        let mut document = ChecklistDocument::from_bytes(&bytes)?;

        let groups = group_leaves(&mut document.blocks, self.settings.max_group_size);
        let leaves: Vec<Block> = groups
            .into_iter()
            .flat_map(|group| group.leaves)
            .collect();
        tracing::info!(
            request_id,
            leaves = leaves.len(),
            "Extracted checklist leaves for answering"
        );

        let answerer = Arc::new(RetrievalAnswerer::new(
            Arc::clone(&self.embedding),
            Arc::clone(&self.index),
            Arc::clone(&self.chat),
            self.settings.retrieval_top_k,
            self.settings.system_prompt.clone(),
            self.settings.user_prompt.clone(),
        ));
        let progress = Arc::new(RunProgress::new());
        let results = process_all(
            answerer,
            leaves,
            request_id,
            self.settings.answer_batch_size,
            self.settings.answer_max_workers,
            Arc::clone(&progress),
        )
        .await;

        let artifact_path = publish(
            &document.meta_data,
            &results,
            request_id,
            checklist_path,
            self.blob_store.as_ref(),
        )
        .await?;

        let snapshot = progress.snapshot();
        tracing::info!(
            request_id,
            processed = snapshot.processed,
            failed = snapshot.failed,
            artifact = %artifact_path,
            "Checklist answering completed"
        );
        Ok(AnswerOutcome {
            leaves: results.len(),
            processed: snapshot.processed,
            failed: snapshot.failed,
            artifact_path,
        })
    }
}
