use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{AppError, Result};

/// Catalog record for one game
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub developer: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    /// Name supplied by the client; only used when serving the download
    pub file_name: Option<String>,
    /// Blob key relative to the storage root
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata fields accepted on upload, as sent by the client
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub developer: Option<String>,
    pub release_date: Option<String>,
}

/// Partial metadata update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGameRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub developer: Option<String>,
    pub release_date: Option<String>,
}

/// Validated partial update. `None` leaves a field alone; `Some(None)`
/// clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub genre: Option<Option<String>>,
    pub developer: Option<Option<String>>,
    pub release_date: Option<Option<DateTime<Utc>>>,
}

impl UpdateGameRequest {
    /// Blank optional fields clear the stored value; a blank title is rejected.
    pub fn into_changes(self) -> Result<GameChanges> {
        let title = match self.title {
            Some(t) => Some(require_title(Some(t.as_str()))?),
            None => None,
        };
        let release_date = match self.release_date {
            Some(raw) => Some(parse_release_date(&raw)?),
            None => None,
        };

        Ok(GameChanges {
            title,
            description: self.description.map(|v| non_empty(Some(v))),
            genre: self.genre.map(|v| non_empty(Some(v))),
            developer: self.developer.map(|v| non_empty(Some(v))),
            release_date,
        })
    }
}

/// File fields attached to a record at creation
#[derive(Debug, Clone, PartialEq)]
pub struct GameFile {
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
}

/// Validated record ready to be inserted
#[derive(Debug, Clone)]
pub struct NewGame {
    pub title: String,
    pub description: Option<String>,
    pub genre: Option<String>,
    pub developer: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub file: Option<GameFile>,
}

impl NewGame {
    pub fn from_metadata(metadata: GameMetadata, file: Option<GameFile>) -> Result<Self> {
        let title = require_title(metadata.title.as_deref())?;
        let release_date = match metadata.release_date.as_deref() {
            Some(raw) => parse_release_date(raw)?,
            None => None,
        };

        Ok(Self {
            title,
            description: non_empty(metadata.description),
            genre: non_empty(metadata.genre),
            developer: non_empty(metadata.developer),
            release_date,
            file,
        })
    }
}

/// Title must be present and not blank
pub fn require_title(title: Option<&str>) -> Result<String> {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(AppError::Validation("Title is required".to_string())),
    }
}

/// Blank text counts as absent
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp.
/// An empty string means the date is unknown.
pub fn parse_release_date(raw: &str) -> Result<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| AppError::Validation(format!("Invalid release date: {}", raw)))
}
