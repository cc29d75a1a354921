use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// Stream of upload or download chunks
pub type ByteStream<'a> = BoxStream<'a, std::io::Result<Bytes>>;

/// Result of a completed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    /// Generated storage key, relative to the store root
    pub key: String,
    pub size: u64,
}

/// Readable blob handed back for downloads
pub struct BlobContent {
    pub size: u64,
    pub stream: ByteStream<'static>,
}

/// Blob storage trait
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a stream under a freshly generated key that keeps the
    /// extension of `name_hint`. Nothing is left behind on failure.
    async fn store(&self, name_hint: &str, data: ByteStream<'_>) -> Result<StoredBlob>;

    /// Check if a blob exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Open a blob for streaming
    async fn open(&self, key: &str) -> Result<BlobContent>;

    /// Remove a blob. Removing a missing blob succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
