//! Axum router setup for the Schemascope API

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{clear_cache, get_graph, get_status, health_check, rebuild_graph},
    ServerState,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/graph", get(get_graph))
        .route("/graph/rebuild", post(rebuild_graph))
        .route("/cache/clear", post(clear_cache))
        .route("/status", get(get_status))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
