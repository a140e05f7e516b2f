use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::server::GameServer;

use super::handler::websocket_handler;

/// Build the HTTP router: websocket upgrade, health check, and the static
/// SPA bundle with an index.html fallback for client-side routing.
pub fn create_router(server: Arc<GameServer>) -> Router {
    let static_dir = server.config().static_dir.clone();
    let spa = ServeDir::new(&static_dir)
        .fallback(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health))
        .with_state(server)
        .fallback_service(spa)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
