//! Blob storage abstraction used for checklist input, extraction artifacts, and answers.
//!
//! The pipeline only ever needs three operations: read a whole blob, read a blob as a byte
//! stream, and write a blob. Deployments back this with an object store; the crate ships a
//! filesystem implementation rooted at `BLOB_ROOT` which is also what the tests use.

use async_stream::try_stream;
use async_trait::async_trait;
use futures_core::Stream;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncReadExt;

/// Errors raised by blob storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The named blob does not exist.
    #[error("Blob not found: {0}")]
    NotFound(String),
    /// The blob name escapes the store root or is otherwise malformed.
    #[error("Invalid blob name: {0}")]
    InvalidName(String),
    /// Underlying I/O failure.
    #[error("Blob I/O failed for '{name}': {source}")]
    Io {
        /// Blob the operation targeted.
        name: String,
        /// Underlying error raised by the filesystem.
        #[source]
        source: std::io::Error,
    },
}

/// Byte-chunk stream produced by [`BlobStore::read_stream`].
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, StorageError>> + Send>>;

/// Interface implemented by blob storage backends.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read an entire blob into memory.
    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Open a blob as a lazy byte-chunk stream.
    async fn read_stream(&self, name: &str) -> Result<ByteStream, StorageError>;

    /// Write a blob, replacing any existing content.
    async fn write(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

const STREAM_CHUNK_BYTES: usize = 64 * 1024;

/// Filesystem-backed blob store rooted at a single directory.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|component| {
            matches!(component, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if name.trim().is_empty() || escapes {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(name.to_string())
            } else {
                StorageError::Io {
                    name: name.to_string(),
                    source,
                }
            }
        })
    }

    async fn read_stream(&self, name: &str) -> Result<ByteStream, StorageError> {
        let path = self.resolve(name)?;
        let owned_name = name.to_string();
        let mut file = tokio::fs::File::open(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(owned_name.clone())
            } else {
                StorageError::Io {
                    name: owned_name.clone(),
                    source,
                }
            }
        })?;

        let stream = try_stream! {
            let mut buffer = vec![0u8; STREAM_CHUNK_BYTES];
            loop {
                let read = file.read(&mut buffer).await.map_err(|source| StorageError::Io {
                    name: owned_name.clone(),
                    source,
                })?;
                if read == 0 {
                    break;
                }
                yield buffer[..read].to_vec();
            }
        };
        Ok(Box::pin(stream))
    }

    async fn write(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    name: name.to_string(),
                    source,
                })?;
        }
        tracing::debug!(blob = name, content_type, bytes = bytes.len(), "Writing blob");
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                name: name.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn round_trips_bytes_through_nested_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        store
            .write("req-1/answers/out.json", b"{}".to_vec(), "application/json")
            .await
            .expect("write");
        let bytes = store.read_bytes("req-1/answers/out.json").await.expect("read");
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn streams_whole_blob_in_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        let payload = vec![7u8; STREAM_CHUNK_BYTES + 100];
        store
            .write("big.bin", payload.clone(), "application/octet-stream")
            .await
            .expect("write");

        let mut stream = store.read_stream("big.bin").await.expect("stream");
        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            collected.extend(chunk.expect("chunk"));
            chunks += 1;
        }
        assert_eq!(collected, payload);
        assert!(chunks >= 2);
    }

    #[tokio::test]
    async fn missing_blob_reports_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.read_bytes("absent.json").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_escaping_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.read_bytes("../outside.json").await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
