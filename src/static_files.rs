use std::path::Path;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::services::ServeDir;

/// Legacy `/downloads/*` route: stored files served straight from the
/// storage root under their storage keys. Hidden entries such as the
/// staging directory are never served.
pub fn downloads_router<S>(root: &Path) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .nest_service(
            "/downloads",
            ServeDir::new(root).append_index_html_on_directories(false),
        )
        .layer(middleware::from_fn(reject_hidden_paths))
}

async fn reject_hidden_paths(request: Request, next: Next) -> Response {
    let hidden = request.uri().path().split('/').any(|segment| {
        urlencoding::decode(segment)
            .map(|decoded| decoded.starts_with('.'))
            .unwrap_or(true)
    });

    if hidden {
        tracing::debug!("Refusing hidden download path {}", request.uri().path());
        return StatusCode::NOT_FOUND.into_response();
    }

    next.run(request).await
}
