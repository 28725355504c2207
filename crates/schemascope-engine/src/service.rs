//! Graph service: routes requests to engines and owns the cache policy

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use schemascope_core::config::{CacheBackend, DEFAULT_BUILD_TIMEOUT_SECS};
use schemascope_core::{
    CacheEntry, CacheFilter, CacheKey, CacheStatus, Config, GraphCacheRepository, GraphError, GraphRequest,
    GraphResult, Mode, Source,
};

use crate::data::{DataGraphBuilder, DataGraphOptions};
use crate::engine::QueryEngine;
use crate::schema::SchemaGraphBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// Per-source reachability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: BTreeMap<String, String>,
}

pub struct GraphService {
    engines: HashMap<Source, Arc<dyn QueryEngine>>,
    repository: Arc<GraphCacheRepository>,
    data_options: DataGraphOptions,
    build_timeout: Duration,
}

impl GraphService {
    pub fn new(repository: Arc<GraphCacheRepository>) -> Self {
        Self {
            engines: HashMap::new(),
            repository,
            data_options: DataGraphOptions::default(),
            build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
        }
    }

    /// Register `engine` for its source, replacing any previous one.
    pub fn with_engine(mut self, engine: Arc<dyn QueryEngine>) -> Self {
        self.engines.insert(engine.source(), engine);
        self
    }

    pub fn with_data_options(mut self, options: DataGraphOptions) -> Self {
        self.data_options = options;
        self
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    /// Wire engines, cache backend and build limits from `config`.
    pub fn from_config(config: &Config) -> Result<Self, GraphError> {
        let repository = match config.cache.backend {
            CacheBackend::Memory => GraphCacheRepository::in_memory(),
            CacheBackend::Disk => GraphCacheRepository::on_disk(&config.cache.root),
        };
        let mut service = GraphService::new(Arc::new(repository))
            .with_data_options(DataGraphOptions::from(&config.build))
            .with_build_timeout(config.build_timeout());
        for engine in crate::create_engines(config)? {
            service = service.with_engine(engine);
        }
        Ok(service)
    }

    pub fn repository(&self) -> &Arc<GraphCacheRepository> {
        &self.repository
    }

    pub fn sources(&self) -> Vec<Source> {
        let mut sources: Vec<Source> = self.engines.keys().copied().collect();
        sources.sort();
        sources
    }

    fn engine(&self, source: Source) -> Result<&Arc<dyn QueryEngine>, GraphError> {
        self.engines.get(&source).ok_or(GraphError::SourceUnavailable(source))
    }

    /// Cache key for `request`, with an absent or blank scope replaced by the
    /// engine's default so both spellings share one entry.
    pub fn resolve_key(&self, request: &GraphRequest) -> Result<CacheKey, GraphError> {
        let engine = self.engine(request.source)?;
        let scope = request
            .scope
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| engine.default_scope());
        Ok(CacheKey::new(request.source, request.mode, Some(scope.to_string())))
    }

    /// Serve from cache when allowed, otherwise build. Concurrent misses for
    /// one key share a single build.
    pub async fn get_graph(&self, request: &GraphRequest, use_cache: bool) -> Result<GraphResult, GraphError> {
        let key = self.resolve_key(request)?;
        if use_cache {
            match self.repository.get(&key) {
                Ok(Some(entry)) => return Ok(GraphResult::from_entry(&entry, true)),
                Ok(None) => {}
                Err(e) => tracing::warn!("Cache read for {} failed, building directly: {}", key, e),
            }
        }
        let entry = self.build(key).await?;
        Ok(GraphResult::from_entry(&entry, false))
    }

    /// Always rebuild and overwrite the cache entry.
    pub async fn rebuild(&self, request: &GraphRequest) -> Result<GraphResult, GraphError> {
        self.get_graph(request, false).await
    }

    /// Remove matching entries. Returns how many were removed.
    pub fn clear_cache(&self, filter: &CacheFilter) -> Result<usize, GraphError> {
        Ok(self.repository.clear(filter)?)
    }

    /// Cached-ness and source metadata, without building. An unknown scope
    /// is `SchemaNotFound`, as it would be for a build.
    pub async fn status(&self, request: &GraphRequest) -> Result<CacheStatus, GraphError> {
        let key = self.resolve_key(request)?;
        match self.repository.get(&key) {
            Ok(Some(entry)) => {
                return Ok(CacheStatus {
                    cached: true,
                    source_file_count: entry.source_metadata.source_file_count,
                    source_location: entry.source_metadata.source_location.clone(),
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache read for {} failed, reporting uncached: {}", key, e),
        }
        let engine = self.engine(key.source)?;
        if let Some(scope) = &key.scope {
            engine.ensure_scope(scope).await?;
        }
        let metadata = engine.source_metadata().await?;
        Ok(CacheStatus {
            cached: false,
            source_file_count: metadata.source_file_count,
            source_location: metadata.source_location,
        })
    }

    pub async fn health(&self) -> HealthReport {
        let mut details = BTreeMap::new();
        let mut healthy = true;
        for source in self.sources() {
            let Ok(engine) = self.engine(source) else {
                continue;
            };
            let outcome = match tokio::time::timeout(self.build_timeout, engine.ping()).await {
                Ok(Ok(())) => "ok".to_string(),
                Ok(Err(e)) => {
                    healthy = false;
                    e.to_string()
                }
                Err(_) => {
                    healthy = false;
                    "ping timed out".to_string()
                }
            };
            details.insert(source.to_string(), outcome);
        }
        HealthReport {
            status: if healthy { HealthStatus::Ok } else { HealthStatus::Degraded },
            details,
        }
    }

    async fn build(&self, key: CacheKey) -> Result<Arc<CacheEntry>, GraphError> {
        let engine = Arc::clone(self.engine(key.source)?);
        let options = self.data_options;
        let timeout = self.build_timeout;
        let mode = key.mode;
        let label = key.to_string();
        let scope = key
            .scope
            .clone()
            .unwrap_or_else(|| engine.default_scope().to_string());

        self.repository
            .build_once(key, move || async move {
                let started = Instant::now();
                let work = async {
                    let snapshot = engine.snapshot().await?;
                    let engine = snapshot.unwrap_or(engine);
                    let graph = match mode {
                        Mode::Schema => SchemaGraphBuilder::new(Arc::clone(&engine)).build(&scope).await?,
                        Mode::Data => DataGraphBuilder::new(Arc::clone(&engine), options).build(&scope).await?,
                    };
                    let metadata = engine.source_metadata().await?;
                    Ok::<_, GraphError>((graph, metadata))
                };
                match tokio::time::timeout(timeout, work).await {
                    Ok(Ok((graph, metadata))) => {
                        tracing::info!(
                            "Built {} in {:?}: {} nodes, {} edges",
                            label,
                            started.elapsed(),
                            graph.node_count(),
                            graph.edge_count()
                        );
                        Ok((graph, metadata))
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Build of {} failed: {}", label, e);
                        Err(e)
                    }
                    Err(_) => {
                        tracing::warn!("Build of {} timed out after {:?}", label, timeout);
                        Err(GraphError::Timeout {
                            key: label,
                            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        })
                    }
                }
            })
            .await
    }
}
