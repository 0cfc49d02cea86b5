//! Streaming extraction reader and token-bounded chunking.

pub mod chunking;
pub mod stream;

pub use chunking::{
    ChunkRecord, ChunkingError, DEFAULT_CHUNK_MAX_TOKENS, DEFAULT_CHUNK_OVERLAP_WORDS,
    chunk_documents,
};
pub use stream::{DocumentEntry, IngestError, ItemScanner, stream_entries};
