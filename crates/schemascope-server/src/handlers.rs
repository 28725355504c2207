//! REST API handlers for the Schemascope server

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Serialize;

use schemascope_core::{CacheFilter, CacheStatus, GraphError, GraphRequest, GraphResult, Mode, Source};
use schemascope_engine::HealthReport;

use crate::{ApiError, ServerState};

type Params = HashMap<String, String>;

/// Response of `POST /cache/clear`
#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub removed: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub version: String,
}

fn param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Build the request from `source`, `mode` and `scope`. A missing source
/// falls back to the server default; a missing mode to `default_mode`.
fn parse_request(params: &Params, default_source: Source, default_mode: Option<Mode>) -> Result<GraphRequest, GraphError> {
    let source = match param(params, "source") {
        Some(raw) => raw.parse()?,
        None => default_source,
    };
    let mode = match (param(params, "mode"), default_mode) {
        (Some(raw), _) => raw.parse()?,
        (None, Some(mode)) => mode,
        (None, None) => return Err(GraphError::InvalidRequest("missing 'mode' parameter".to_string())),
    };
    let request = GraphRequest::new(source, mode);
    Ok(match param(params, "scope") {
        Some(scope) => request.with_scope(scope),
        None => request,
    })
}

fn parse_flag(params: &Params, name: &str, default: bool) -> Result<bool, GraphError> {
    match param(params, name).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(GraphError::InvalidRequest(format!(
            "'{name}' must be true or false, got '{other}'"
        ))),
    }
}

/// `GET /graph?source=&mode=&scope=&useCache=`
pub async fn get_graph(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<Params>,
) -> Result<Json<GraphResult>, ApiError> {
    let request = parse_request(&params, state.default_source, None)?;
    let use_cache = parse_flag(&params, "useCache", true)?;
    let result = state.service.get_graph(&request, use_cache).await?;
    Ok(Json(result))
}

/// `POST /graph/rebuild?source=&mode=&scope=`
pub async fn rebuild_graph(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<Params>,
) -> Result<Json<GraphResult>, ApiError> {
    let request = parse_request(&params, state.default_source, None)?;
    let result = state.service.rebuild(&request).await?;
    Ok(Json(result))
}

/// `POST /cache/clear`, every parameter optional. No parameters clears all.
pub async fn clear_cache(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<Params>,
) -> Result<Json<ClearResponse>, ApiError> {
    let filter = CacheFilter {
        source: param(&params, "source").map(str::parse).transpose()?,
        mode: param(&params, "mode").map(str::parse).transpose()?,
        scope: param(&params, "scope").map(str::to_string),
    };
    let removed = state.service.clear_cache(&filter)?;
    Ok(Json(ClearResponse { success: true, removed }))
}

/// `GET /status?source=&mode=&scope=`, mode defaulting to `schema`.
pub async fn get_status(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<Params>,
) -> Result<Json<CacheStatus>, ApiError> {
    let request = parse_request(&params, state.default_source, Some(Mode::Schema))?;
    let status = state.service.status(&request).await?;
    Ok(Json(status))
}

/// `GET /health`
pub async fn health_check(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        report: state.service.health().await,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
