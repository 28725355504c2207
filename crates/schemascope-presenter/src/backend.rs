//! Where the presenter gets graphs from

use std::sync::Arc;

use async_trait::async_trait;

use schemascope_core::{CacheFilter, CacheStatus, GraphError, GraphRequest, GraphResult};
use schemascope_engine::GraphService;

#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn get_graph(&self, request: &GraphRequest, use_cache: bool) -> Result<GraphResult, GraphError>;

    async fn rebuild(&self, request: &GraphRequest) -> Result<GraphResult, GraphError>;

    /// Returns the number of entries removed.
    async fn clear_cache(&self, filter: &CacheFilter) -> Result<usize, GraphError>;

    async fn status(&self, request: &GraphRequest) -> Result<CacheStatus, GraphError>;
}

/// In-process backend over a shared service.
pub struct LocalBackend {
    service: Arc<GraphService>,
}

impl LocalBackend {
    pub fn new(service: Arc<GraphService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl GraphBackend for LocalBackend {
    async fn get_graph(&self, request: &GraphRequest, use_cache: bool) -> Result<GraphResult, GraphError> {
        self.service.get_graph(request, use_cache).await
    }

    async fn rebuild(&self, request: &GraphRequest) -> Result<GraphResult, GraphError> {
        self.service.rebuild(request).await
    }

    async fn clear_cache(&self, filter: &CacheFilter) -> Result<usize, GraphError> {
        self.service.clear_cache(filter)
    }

    async fn status(&self, request: &GraphRequest) -> Result<CacheStatus, GraphError> {
        self.service.status(request).await
    }
}
