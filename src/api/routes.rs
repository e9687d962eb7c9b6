//! API route definitions

use axum::routing::get;
use axum::routing::post;
use axum::Router;

use super::handlers;
use super::handlers::AppState;
use super::ws;

/// Create RESTful API router, mounted under `/api`
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Run lifecycle
        .route("/runs", post(handlers::create_run).get(handlers::list_runs))
        .route("/runs/:id", get(handlers::get_run))
        .with_state(state)
}

/// Live notification channel
pub fn ws_routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}
