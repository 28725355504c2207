//! Presenter state published to subscribers

use chrono::{DateTime, Utc};
use serde::Serialize;

use schemascope_core::{CacheStatus, GenericGraph, RenderGraph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Loaded,
    Error,
}

/// Immutable snapshot handed to subscribers and callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenterState {
    pub phase: Phase,
    pub graph: Option<RenderGraph>,
    pub generic_graph: Option<GenericGraph>,
    pub loading: bool,
    pub error: Option<String>,
    pub cache_status: CacheStatus,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl PresenterState {
    pub fn is_empty(&self) -> bool {
        self.generic_graph.as_ref().is_none_or(GenericGraph::is_empty)
    }
}
