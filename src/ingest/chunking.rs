//! Sentence-accumulating chunker with token budgets and word overlap.
//!
//! Paragraph text is split at sentence boundaries (punctuation followed by whitespace) and
//! sentences are accumulated while the token count stays within budget. When a chunk closes,
//! the next one is seeded with the tail words of the previous chunk so retrieval keeps
//! context across boundaries. Token counting resolves a `tiktoken-rs` encoding for the
//! configured embedding model, falling back to `cl100k_base` for unknown models.

use anyhow::Error as TokenizerError;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::stream::DocumentEntry;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Token budget per chunk when no override is configured.
pub const DEFAULT_CHUNK_MAX_TOKENS: usize = 500;

/// Words of overlap carried between adjacent chunks when no override is configured.
pub const DEFAULT_CHUNK_OVERLAP_WORDS: usize = 50;

/// Errors produced while turning paragraphs into token-bounded chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk token budget must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// A token-bounded slice of paragraph text, tagged with provenance.
///
/// The embedding is attached once after the chunk text is embedded; a record is never
/// mutated afterwards.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Page of the entry that started this chunk.
    pub page_number: Option<u32>,
    /// Paragraph of the entry that started this chunk.
    pub paragraph_number: Option<u32>,
    /// Position of the chunk within its source entry.
    pub chunk_index: usize,
    /// Chunk text, including any overlap seed.
    pub text: String,
    /// Token count of `text` under the active counter.
    pub token_count: usize,
    /// Embedding vector, attached after the embedding step.
    pub embedding: Option<Vec<f32>>,
}

/// Split document entries into token-bounded, overlapping chunks.
///
/// `max_tokens` caps each chunk, with two tolerated overruns: a single sentence longer
/// than the budget still becomes its own chunk, and a follow-up chunk whose overlap seed
/// plus first sentence already exceed the budget closes only at the next sentence boundary.
/// `overlap_words` seeds each follow-up chunk with the closing words of its predecessor.
/// Provenance comes from the entry that started the chunk.
pub fn chunk_documents(
    entries: &[DocumentEntry],
    max_tokens: usize,
    overlap_words: usize,
    model: &str,
) -> Result<Vec<ChunkRecord>, ChunkingError> {
    if max_tokens == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    let counter = build_token_counter(model)?;
    Ok(chunk_documents_with_counter(
        entries,
        max_tokens,
        overlap_words,
        &counter,
    ))
}

fn chunk_documents_with_counter(
    entries: &[DocumentEntry],
    max_tokens: usize,
    overlap_words: usize,
    counter: &TokenCounter,
) -> Vec<ChunkRecord> {
    let mut records = Vec::new();

    for entry in entries {
        let text = entry.text.trim();
        if text.is_empty() {
            continue;
        }

        let mut chunk_index = 0;
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in split_sentences(text) {
            let sentence_tokens = counter.as_ref()(sentence);
            if !current.is_empty() && current_tokens + sentence_tokens > max_tokens {
                push_chunk(&mut records, entry, chunk_index, &current, counter);
                chunk_index += 1;

                let seed = tail_words(&current, overlap_words);
                if seed.is_empty() {
                    current = sentence.to_string();
                } else {
                    current = format!("{seed} {sentence}");
                }
                current_tokens = counter.as_ref()(&current);
            } else {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(sentence);
                current_tokens += sentence_tokens;
            }
        }

        if !current.trim().is_empty() {
            push_chunk(&mut records, entry, chunk_index, &current, counter);
        }
    }

    records
}

fn push_chunk(
    records: &mut Vec<ChunkRecord>,
    entry: &DocumentEntry,
    chunk_index: usize,
    text: &str,
    counter: &TokenCounter,
) {
    let trimmed = text.trim();
    records.push(ChunkRecord {
        page_number: entry.page_number,
        paragraph_number: entry.paragraph_number,
        chunk_index,
        text: trimmed.to_string(),
        token_count: counter.as_ref()(trimmed),
        embedding: None,
    });
}

/// Split text at sentence boundaries: a run of `.`, `!`, or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') {
            let mut end = i + 1;
            while end < bytes.len() && matches!(bytes[end], b'.' | b'!' | b'?') {
                end += 1;
            }
            if end < bytes.len() && bytes[end].is_ascii_whitespace() {
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
                i = end;
                continue;
            }
            i = end;
        } else {
            i += 1;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Last `count` whitespace-separated words of `text`.
fn tail_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

/// Build a token counter for the configured embedding model.
///
/// Tries the model name, then an encoding-name lookup, then falls back to `cl100k_base`.
fn build_token_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}
