use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::Path;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

use crate::api::{handlers, state::AppState};
use crate::config::ServerConfig;

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/predict", post(handlers::predict))
        .route("/api/history", get(handlers::get_history))
        .route("/health", get(handlers::health_handler))
        .layer(cors)
        .with_state(state)
}

/// Full server router: API, upload limit and the optional static front-end.
pub fn create_app(state: AppState, server: &ServerConfig) -> Router {
    let body_limit = match server.max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };
    let router = create_router(state).layer(body_limit);

    if Path::new(&server.static_dir).is_dir() {
        info!("Serving static files from {}", server.static_dir.display());
        router.fallback_service(ServeDir::new(&server.static_dir))
    } else {
        router
    }
}
