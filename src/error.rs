use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("No file was uploaded")]
    MissingFile,

    #[error("{0}")]
    NotFound(String),

    #[error("Upload exceeds the maximum size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Failed to store file: {0}")]
    StorageWrite(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::MissingFile | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(_)
            | AppError::StorageWrite(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn game_not_found() -> Self {
        AppError::NotFound("Game not found".to_string())
    }

    pub fn file_not_found() -> Self {
        AppError::NotFound("File not found".to_string())
    }
}

/// Error body, `{"error": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Success body carrying a message and, optionally, the affected game
#[derive(Debug, Serialize)]
pub struct MessageResponse<T: Serialize> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game: Option<T>,
}

impl<T: Serialize> MessageResponse<T> {
    pub fn with_game(message: &str, game: T) -> Self {
        Self {
            message: message.to_string(),
            game: Some(game),
        }
    }
}

impl MessageResponse<()> {
    pub fn message(message: &str) -> Self {
        Self {
            message: message.to_string(),
            game: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
