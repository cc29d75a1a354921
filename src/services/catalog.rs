use chrono::{SubsecRound, Utc};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{require_title, Game, GameChanges, NewGame};

/// Persistence for game records
#[derive(Clone)]
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List every game in insertion order
    pub async fn list(&self) -> Result<Vec<Game>> {
        let games: Vec<Game> = sqlx::query_as("SELECT * FROM games ORDER BY rowid ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(games)
    }

    /// Get a game by ID
    pub async fn get(&self, id: &str) -> Result<Game> {
        let game: Game = sqlx::query_as("SELECT * FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(AppError::game_not_found)?;

        Ok(game)
    }

    /// Insert a new game and return it with its assigned ID
    pub async fn create(&self, new_game: NewGame) -> Result<Game> {
        let title = require_title(Some(new_game.title.as_str()))?;

        let game = Game {
            id: Uuid::new_v4().to_string(),
            title,
            description: new_game.description,
            genre: new_game.genre,
            developer: new_game.developer,
            release_date: new_game.release_date,
            file_name: new_game.file.as_ref().map(|f| f.file_name.clone()),
            file_path: new_game.file.as_ref().map(|f| f.file_path.clone()),
            file_size: new_game.file.as_ref().map(|f| f.file_size),
            uploaded_at: Utc::now().trunc_subsecs(3),
        };

        sqlx::query(
            r#"
            INSERT INTO games (id, title, description, genre, developer, release_date, file_name, file_path, file_size, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&game.id)
        .bind(&game.title)
        .bind(&game.description)
        .bind(&game.genre)
        .bind(&game.developer)
        .bind(game.release_date)
        .bind(&game.file_name)
        .bind(&game.file_path)
        .bind(game.file_size)
        .bind(game.uploaded_at)
        .execute(self.db.pool())
        .await?;

        tracing::info!("Created game {} ({:?})", game.id, game.title);
        Ok(game)
    }

    /// Apply a metadata update. File fields are never touched here.
    pub async fn update(&self, id: &str, changes: GameChanges) -> Result<Game> {
        let result = sqlx::query(
            r#"
            UPDATE games SET
                title = COALESCE(?1, title),
                description = CASE WHEN ?2 THEN ?3 ELSE description END,
                genre = CASE WHEN ?4 THEN ?5 ELSE genre END,
                developer = CASE WHEN ?6 THEN ?7 ELSE developer END,
                release_date = CASE WHEN ?8 THEN ?9 ELSE release_date END
            WHERE id = ?10
            "#,
        )
        .bind(&changes.title)
        .bind(changes.description.is_some())
        .bind(changes.description.flatten())
        .bind(changes.genre.is_some())
        .bind(changes.genre.flatten())
        .bind(changes.developer.is_some())
        .bind(changes.developer.flatten())
        .bind(changes.release_date.is_some())
        .bind(changes.release_date.flatten())
        .bind(id)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::game_not_found());
        }

        tracing::info!("Updated game {}", id);
        self.get(id).await
    }

    /// Delete a game record
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM games WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::game_not_found());
        }

        tracing::info!("Deleted game {}", id);
        Ok(())
    }
}
