use std::io::Cursor;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::io::AsyncRead;

/// A readable stream of audio bytes.
pub type BlobReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("no blob is stored under key {0}")]
    Missing(String),
    #[error("blob store unavailable: {0}")]
    Unavailable(String),
}

/// Access to the stored audio bytes of tracks, addressed by the storage key
/// the upload collaborator wrote them under.
///
/// Upload, validation, and range serving happen elsewhere. The coordinator
/// only ever asks whether a track is playable before starting it, and opens
/// a reader on behalf of a streaming layer.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
    async fn open_for_read(&self, key: &str) -> Result<BlobReader, BlobError>;
}

/// A [BlobStore] keeping audio bytes in memory, used by tests and small
/// embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&self, key: impl ToString, bytes: Vec<u8>) {
        self.blobs.insert(key.to_string(), bytes);
    }

    pub fn remove(&self, key: &str) {
        self.blobs.remove(key);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        Ok(self.blobs.contains_key(key))
    }

    async fn open_for_read(&self, key: &str) -> Result<BlobReader, BlobError> {
        let bytes = self
            .blobs
            .get(key)
            .map(|b| b.clone())
            .ok_or_else(|| BlobError::Missing(key.to_string()))?;

        Ok(Box::new(Cursor::new(bytes)))
    }
}
