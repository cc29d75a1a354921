use std::sync::Arc;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Game, GameFile, GameMetadata, NewGame, UpdateGameRequest};
use crate::services::CatalogService;
use crate::storage::{BlobContent, BlobStore, ByteStream};

/// A stored blob ready to be streamed under its client-facing name
pub struct GameDownload {
    pub file_name: String,
    pub content: BlobContent,
}

/// Game service
///
/// Keeps catalog records and their blobs in step: blobs are written before
/// the record that points at them, and removed before the record itself.
/// Nothing spans both resources transactionally.
#[derive(Clone)]
pub struct GameService {
    catalog: CatalogService,
    storage: Arc<dyn BlobStore>,
}

impl GameService {
    pub fn new(db: Database, storage: Arc<dyn BlobStore>) -> Self {
        Self {
            catalog: CatalogService::new(db),
            storage,
        }
    }

    pub async fn list(&self) -> Result<Vec<Game>> {
        self.catalog.list().await
    }

    pub async fn get(&self, id: &str) -> Result<Game> {
        self.catalog.get(id).await
    }

    /// Update metadata only; the file fields stay as uploaded
    pub async fn update(&self, id: &str, req: UpdateGameRequest) -> Result<Game> {
        let changes = req.into_changes()?;
        self.catalog.update(id, changes).await
    }

    /// Write an uploaded file to blob storage
    pub async fn store_file(&self, file_name: &str, data: ByteStream<'_>) -> Result<GameFile> {
        let blob = self.storage.store(file_name, data).await?;
        tracing::info!(
            "Stored upload {:?} as {} ({} bytes)",
            file_name,
            blob.key,
            blob.size
        );

        let file_name = if file_name.is_empty() {
            blob.key.clone()
        } else {
            file_name.to_string()
        };
        let file_size = i64::try_from(blob.size)
            .map_err(|_| AppError::StorageWrite("File size out of range".to_string()))?;

        Ok(GameFile {
            file_name,
            file_path: blob.key,
            file_size,
        })
    }

    /// Remove a stored file that will not be referenced by any record
    pub async fn discard_file(&self, file: &GameFile) {
        match self.storage.delete(&file.file_path).await {
            Ok(()) => tracing::info!("Discarded unreferenced upload {}", file.file_path),
            Err(e) => tracing::error!(
                "Failed to discard unreferenced upload {}, it is now orphaned: {}",
                file.file_path,
                e
            ),
        }
    }

    /// Create a record for an already stored file.
    ///
    /// Fails with `MissingFile` when no file was uploaded. If the record
    /// cannot be created, the file is removed again.
    pub async fn create_with_file(
        &self,
        metadata: GameMetadata,
        file: Option<GameFile>,
    ) -> Result<Game> {
        let file = file.ok_or(AppError::MissingFile)?;

        let new_game = match NewGame::from_metadata(metadata, Some(file.clone())) {
            Ok(new_game) => new_game,
            Err(e) => {
                self.discard_file(&file).await;
                return Err(e);
            }
        };

        match self.catalog.create(new_game).await {
            Ok(game) => Ok(game),
            Err(e) => {
                tracing::warn!("Catalog insert failed after storing {}: {}", file.file_path, e);
                self.discard_file(&file).await;
                Err(e)
            }
        }
    }

    /// Resolve a game's file for download.
    ///
    /// A record without a file and a file missing from disk both surface as
    /// `NotFound`; only the log tells them apart.
    pub async fn read_with_download(&self, id: &str) -> Result<GameDownload> {
        let game = self.catalog.get(id).await?;

        let Some(path) = game.file_path.as_deref() else {
            tracing::debug!("Game {} has no file attached", id);
            return Err(AppError::file_not_found());
        };

        if !self.storage.exists(path).await? {
            tracing::warn!("File {} for game {} is missing from storage", path, id);
            return Err(AppError::file_not_found());
        }

        let content = self.storage.open(path).await?;
        let file_name = game.file_name.unwrap_or_else(|| path.to_string());

        Ok(GameDownload { file_name, content })
    }

    /// Delete a game's file, then its record.
    ///
    /// Safe to repeat: a file that is already gone is not an error.
    pub async fn delete_with_cleanup(&self, id: &str) -> Result<()> {
        let game = self.catalog.get(id).await?;

        if let Some(path) = game.file_path.as_deref() {
            self.storage.delete(path).await?;
        }

        self.catalog.delete(id).await
    }
}
