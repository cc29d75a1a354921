use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use rand::Rng;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::{BlobContent, BlobStore, ByteStream, StoredBlob};

const KEY_ATTEMPTS: usize = 3;

/// Subdirectory of the root holding unfinished uploads
pub const STAGING_DIR: &str = ".staging";

/// Local file system blob store.
///
/// Blobs live flat under `base_path` as `<epoch-millis>-<random>.<ext>`.
/// Writes in progress sit in `base_path/.staging` until they are complete.
pub struct LocalBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl LocalBlobStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self::with_limit(config.root(), config.max_upload_size)
    }

    pub fn with_limit(base_path: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            base_path: base_path.into(),
            max_size,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn staging_path(&self) -> PathBuf {
        self.base_path.join(STAGING_DIR)
    }

    /// Resolve a key to its path, refusing anything that could leave the root
    fn get_full_path(&self, key: &str) -> Option<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && !key.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
            && !key.contains("..");
        valid.then(|| self.base_path.join(key))
    }

    /// Create the `.part` file for a fresh key
    async fn create_part_file(&self, name_hint: &str) -> Result<(String, PathBuf, fs::File)> {
        for _ in 0..KEY_ATTEMPTS {
            let key = generate_key(name_hint);
            let final_path = self.base_path.join(&key);
            if fs::metadata(&final_path).await.is_ok() {
                continue;
            }

            let part_path = self.staging_path().join(format!("{}.part", key));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&part_path)
                .await
            {
                Ok(file) => return Ok((key, part_path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(AppError::StorageWrite(format!(
                        "Failed to create {:?}: {}",
                        part_path, e
                    )))
                }
            }
        }

        Err(AppError::StorageWrite(
            "Could not allocate a unique file name".to_string(),
        ))
    }
}

/// Generate a storage key from the current time and a random number,
/// keeping the extension of the client-supplied name.
pub fn generate_key(name_hint: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..=1_000_000_000);

    match sanitized_extension(name_hint) {
        Some(ext) => format!("{}-{}.{}", millis, suffix, ext),
        None => format!("{}-{}", millis, suffix),
    }
}

fn sanitized_extension(name: &str) -> Option<&str> {
    // Client names may come from Windows
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(name);
    Path::new(base)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Removes an unfinished upload unless it was committed, including when
/// the owning future is dropped mid-write.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Discarded partial upload {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to discard partial upload {:?}: {}", self.path, e),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn store(&self, name_hint: &str, mut data: ByteStream<'_>) -> Result<StoredBlob> {
        fs::create_dir_all(self.staging_path()).await.map_err(|e| {
            AppError::StorageWrite(format!("Failed to create storage root: {}", e))
        })?;

        let (key, part_path, mut file) = self.create_part_file(name_hint).await?;
        let guard = PartialFile::new(part_path.clone());

        let mut size: u64 = 0;
        while let Some(chunk) = data.next().await {
            let chunk = chunk
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

            size += chunk.len() as u64;
            if size > self.max_size {
                tracing::warn!("Upload {:?} rejected above {} bytes", name_hint, self.max_size);
                return Err(AppError::PayloadTooLarge {
                    limit: self.max_size,
                });
            }

            file.write_all(&chunk)
                .await
                .map_err(|e| AppError::StorageWrite(format!("Failed to write file: {}", e)))?;
        }

        file.flush()
            .await
            .map_err(|e| AppError::StorageWrite(format!("Failed to flush file: {}", e)))?;
        drop(file);

        let final_path = self.base_path.join(&key);
        fs::rename(&part_path, &final_path)
            .await
            .map_err(|e| AppError::StorageWrite(format!("Failed to finalize file: {}", e)))?;
        guard.commit();

        tracing::debug!("Saved {} bytes to {:?}", size, final_path);
        Ok(StoredBlob { key, size })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let Some(full_path) = self.get_full_path(key) else {
            return Ok(false);
        };

        match fs::metadata(&full_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Storage(format!("Failed to stat {}: {}", key, e))),
        }
    }

    async fn open(&self, key: &str) -> Result<BlobContent> {
        let full_path = self.get_full_path(key).ok_or_else(AppError::file_not_found)?;

        let file = fs::File::open(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::file_not_found()
            } else {
                AppError::Storage(format!("Failed to open file: {}", e))
            }
        })?;
        let size = file.metadata().await?.len();

        Ok(BlobContent {
            size,
            stream: ReaderStream::new(file).boxed(),
        })
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let Some(full_path) = self.get_full_path(key) else {
            tracing::warn!("Refusing to delete invalid blob key {:?}", key);
            return Ok(());
        };

        match fs::remove_file(&full_path).await {
            Ok(()) => {
                tracing::debug!("Deleted file {:?}", full_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("File {:?} already gone", full_path);
                Ok(())
            }
            Err(e) => Err(AppError::Storage(format!("Failed to delete {}: {}", key, e))),
        }
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
