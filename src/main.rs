mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod static_files;
mod storage;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::db::Database;
use crate::services::GameService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub games: GameService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamevault=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting GameVault...");
    if let Ok(path) = dotenv {
        tracing::info!("Loaded environment from {:?}", path);
    }

    // Load configuration
    let config = Config::load()?;
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let db = Database::new(&config.database.url, config.database.max_connections).await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized");

    // Initialize blob storage
    let storage = storage::from_config(&config.storage);

    // Create app state
    let state = AppState {
        config: config.clone(),
        games: GameService::new(db, storage),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/games", get(handlers::game::list_games))
        // Upload size is enforced by the blob store while streaming
        .route(
            "/games/upload",
            post(handlers::game::upload_game).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/games/:id",
            get(handlers::game::get_game)
                .put(handlers::game::update_game)
                .delete(handlers::game::delete_game),
        )
        .route("/games/:id/download", get(handlers::game::download_game));

    Router::new()
        .nest("/api", api_routes)
        .merge(static_files::downloads_router(&state.config.storage.root()))
        .layer(TimeoutLayer::new(state.config.server.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
