use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{StreamExt, TryStreamExt};

use crate::error::{AppError, MessageResponse, Result};
use crate::models::{Game, GameFile, GameMetadata, UpdateGameRequest};
use crate::services::GameService;
use crate::AppState;

/// Multipart field carrying the game file
const FILE_FIELD: &str = "gameFile";
const FILE_FIELD_ALIAS: &str = "file";

/// List all games
/// GET /api/games
pub async fn list_games(State(state): State<AppState>) -> Result<Json<Vec<Game>>> {
    let games = state.games.list().await?;
    Ok(Json(games))
}

/// Get a specific game
/// GET /api/games/:id
pub async fn get_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Game>> {
    let game = state.games.get(&id).await?;
    Ok(Json(game))
}

/// Fields collected from an upload form
#[derive(Default)]
struct UploadForm {
    metadata: GameMetadata,
    file: Option<GameFile>,
}

impl UploadForm {
    async fn read_field(&mut self, games: &GameService, field: Field<'_>) -> Result<()> {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            FILE_FIELD | FILE_FIELD_ALIAS => {
                // Without a filename the part is plain text, not an upload
                let Some(file_name) = field.file_name().map(str::to_string) else {
                    tracing::debug!("Ignoring {:?} part without a filename", name);
                    return Ok(());
                };
                if self.file.is_some() {
                    return Err(AppError::BadRequest(
                        "Only one file may be uploaded".to_string(),
                    ));
                }
                let data = field.map_err(std::io::Error::other).boxed();
                self.file = Some(games.store_file(&file_name, data).await?);
            }
            "title" => self.metadata.title = Some(read_text(field).await?),
            "description" => self.metadata.description = Some(read_text(field).await?),
            "genre" => self.metadata.genre = Some(read_text(field).await?),
            "developer" => self.metadata.developer = Some(read_text(field).await?),
            "releaseDate" => self.metadata.release_date = Some(read_text(field).await?),
            _ => {}
        }

        Ok(())
    }
}

async fn read_text(field: Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {}", e)))
}

/// Upload a new game with its file
/// POST /api/games/upload
pub async fn upload_game(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut form = UploadForm::default();

    loop {
        let step = match multipart.next_field().await {
            Ok(Some(field)) => form.read_field(&state.games, field).await,
            Ok(None) => break,
            Err(e) => Err(AppError::BadRequest(format!(
                "Failed to process multipart: {}",
                e
            ))),
        };

        if let Err(e) = step {
            // Drop any file already stored by this request
            if let Some(file) = &form.file {
                state.games.discard_file(file).await;
            }
            return Err(e);
        }
    }

    let game = state.games.create_with_file(form.metadata, form.file).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::with_game("Game uploaded successfully", game)),
    ))
}

/// Download a game's file under its original name
/// GET /api/games/:id/download
pub async fn download_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let download = state.games.read_with_download(&id).await?;

    let content_type = mime_guess::from_path(&download.file_name).first_or_octet_stream();
    let fallback_name = download.file_name.replace(
        |c: char| c == '"' || c == '\\' || !c.is_ascii() || c.is_ascii_control(),
        "_",
    );
    let encoded_name = urlencoding::encode(&download.file_name);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CONTENT_LENGTH, download.content.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"; filename*=UTF-8''{}",
                fallback_name, encoded_name
            ),
        )
        .body(Body::from_stream(download.content.stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// Update a game's metadata
/// PUT /api/games/:id
pub async fn update_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateGameRequest>,
) -> Result<impl IntoResponse> {
    let game = state.games.update(&id, req).await?;
    Ok(Json(MessageResponse::with_game(
        "Game updated successfully",
        game,
    )))
}

/// Delete a game and its file
/// DELETE /api/games/:id
pub async fn delete_game(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.games.delete_with_cleanup(&id).await?;
    Ok(Json(MessageResponse::message("Game deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::storage::LocalBlobStore;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    const BOUNDARY: &str = "gamevault-test-boundary";

    struct TestApp {
        router: axum::Router,
        root: PathBuf,
        _dir: TempDir,
    }

    async fn create_test_app() -> TestApp {
        let dir = tempdir().unwrap();
        let root = dir.path().join("uploads");
        std::fs::create_dir_all(&root).unwrap();

        let mut config = Config::default();
        config.storage.local_path = root.to_string_lossy().into_owned();
        config.storage.max_upload_size = 64;

        let storage = Arc::new(LocalBlobStore::new(&config.storage));
        let db = Database::in_memory().await.unwrap();
        let state = AppState {
            config: Arc::new(config),
            games: GameService::new(db, storage),
        };

        TestApp {
            router: crate::create_router(state),
            root,
            _dir: dir,
        }
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    /// Encode parts without the closing delimiter
    fn multipart_parts(parts: &[Part]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, file_name, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name, file_name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    fn multipart_request(parts: &[Part]) -> Request<Body> {
        let mut body = multipart_parts(parts);
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        upload_request(body)
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/games/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, request).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn upload(app: &TestApp, title: &str) -> Value {
        let request = multipart_request(&[
            Part::Text("title", title),
            Part::Text("genre", "Platformer"),
            Part::File("gameFile", "jump.zip", b"PK\x03\x04game"),
        ]);
        let (status, body) = send_json(app, request).await;
        assert_eq!(status, StatusCode::CREATED);
        body["game"].clone()
    }

    #[tokio::test]
    async fn test_upload_game() {
        let app = create_test_app().await;

        let request = multipart_request(&[
            Part::File("gameFile", "celeste.zip", b"strawberry"),
            Part::Text("title", "Celeste"),
            Part::Text("releaseDate", "2018-01-25"),
        ]);
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Game uploaded successfully");
        assert_eq!(body["game"]["title"], "Celeste");
        assert_eq!(body["game"]["fileName"], "celeste.zip");
        assert_eq!(body["game"]["fileSize"], 10);
        let key = body["game"]["filePath"].as_str().unwrap();
        assert_eq!(std::fs::read(app.root.join(key)).unwrap(), b"strawberry");
    }

    #[tokio::test]
    async fn test_upload_without_file() {
        let app = create_test_app().await;

        let request = multipart_request(&[Part::Text("title", "Nothing attached")]);
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file was uploaded");

        let (_, games) = send_json(&app, empty_request("GET", "/api/games")).await;
        assert_eq!(games, json!([]));
    }

    #[tokio::test]
    async fn test_upload_without_title_leaves_no_blob() {
        let app = create_test_app().await;

        let request = multipart_request(&[Part::File("file", "untitled.bin", b"data")]);
        let (status, _) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(stored_files(&app.root), 0);
    }

    fn stored_files(root: &std::path::Path) -> usize {
        std::fs::read_dir(root)
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_type().unwrap().is_file())
            .count()
    }

    #[tokio::test]
    async fn test_file_field_without_filename_is_not_a_file() {
        let app = create_test_app().await;

        let request = multipart_request(&[
            Part::Text("title", "Text only"),
            Part::Text("gameFile", "not a file"),
        ]);
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file was uploaded");
        assert_eq!(stored_files(&app.root), 0);
    }

    #[tokio::test]
    async fn test_truncated_upload_discards_stored_file() {
        let app = create_test_app().await;

        let mut body = multipart_parts(&[Part::File("gameFile", "jump.zip", b"PK\x03\x04")]);
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nJu",
                BOUNDARY
            )
            .as_bytes(),
        );
        let (status, _) = send_json(&app, upload_request(body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(stored_files(&app.root), 0);
        let (_, games) = send_json(&app, empty_request("GET", "/api/games")).await;
        assert_eq!(games, json!([]));
    }

    #[tokio::test]
    async fn test_second_file_is_rejected() {
        let app = create_test_app().await;

        let request = multipart_request(&[
            Part::Text("title", "Twice"),
            Part::File("gameFile", "one.zip", b"one"),
            Part::File("file", "two.zip", b"two"),
        ]);
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Bad request: Only one file may be uploaded");
        assert_eq!(stored_files(&app.root), 0);
        let (_, games) = send_json(&app, empty_request("GET", "/api/games")).await;
        assert_eq!(games, json!([]));
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let app = create_test_app().await;

        let request = multipart_request(&[
            Part::Text("title", "Huge"),
            Part::File("gameFile", "huge.bin", &[0u8; 100]),
        ]);
        let (status, _) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(stored_files(&app.root), 0);
    }

    #[tokio::test]
    async fn test_get_and_list() {
        let app = create_test_app().await;
        let first = upload(&app, "Braid").await;
        upload(&app, "Fez").await;

        let uri = format!("/api/games/{}", first["id"].as_str().unwrap());
        let (status, game) = send_json(&app, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(game, first);

        let (status, games) = send_json(&app, empty_request("GET", "/api/games")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(games.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_game() {
        let app = create_test_app().await;

        let (status, body) = send_json(&app, empty_request("GET", "/api/games/unknown")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Game not found");
    }

    #[tokio::test]
    async fn test_download() {
        let app = create_test_app().await;
        let game = upload(&app, "Jump").await;

        let uri = format!("/api/games/{}/download", game["id"].as_str().unwrap());
        let response = app
            .router
            .clone()
            .oneshot(empty_request("GET", &uri))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("filename=\"jump.zip\""));
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"PK\x03\x04game");
    }

    #[tokio::test]
    async fn test_download_after_blob_removed() {
        let app = create_test_app().await;
        let game = upload(&app, "Jump").await;
        std::fs::remove_file(app.root.join(game["filePath"].as_str().unwrap())).unwrap();

        let uri = format!("/api/games/{}/download", game["id"].as_str().unwrap());
        let (status, body) = send_json(&app, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "File not found");
    }

    #[tokio::test]
    async fn test_legacy_downloads_route() {
        let app = create_test_app().await;
        let game = upload(&app, "Jump").await;

        let uri = format!("/downloads/{}", game["filePath"].as_str().unwrap());
        let (status, bytes) = send(&app, empty_request("GET", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bytes, b"PK\x03\x04game");

        let (status, _) = send(&app, empty_request("GET", "/downloads/missing.zip")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_game() {
        let app = create_test_app().await;
        let game = upload(&app, "Jump").await;

        let request = Request::builder()
            .method("PUT")
            .uri(format!("/api/games/{}", game["id"].as_str().unwrap()))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({ "title": "Jump 2", "fileName": "evil.exe", "filePath": "../x" })
                    .to_string(),
            ))
            .unwrap();
        let (status, body) = send_json(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Game updated successfully");
        assert_eq!(body["game"]["title"], "Jump 2");
        assert_eq!(body["game"]["genre"], "Platformer");
        assert_eq!(body["game"]["fileName"], game["fileName"]);
        assert_eq!(body["game"]["filePath"], game["filePath"]);
        assert_eq!(body["game"]["fileSize"], game["fileSize"]);
    }

    #[tokio::test]
    async fn test_update_missing_game() {
        let app = create_test_app().await;

        let request = Request::builder()
            .method("PUT")
            .uri("/api/games/unknown")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "title": "Ghost" }).to_string()))
            .unwrap();
        let (status, _) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_game() {
        let app = create_test_app().await;
        let game = upload(&app, "Jump").await;
        let uri = format!("/api/games/{}", game["id"].as_str().unwrap());

        let (status, body) = send_json(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Game deleted successfully" }));
        assert!(!app.root.join(game["filePath"].as_str().unwrap()).exists());

        let (status, _) = send_json(&app, empty_request("DELETE", &uri)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
