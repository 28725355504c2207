//! Unit tests for schemascope-presenter module

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_test::{assert_err, assert_ok};

use schemascope_core::{
    CacheFilter, CacheStatus, EdgeType, GenericEdge, GenericGraph, GenericNode, GraphAdapter, GraphCacheRepository,
    GraphError, GraphRequest, GraphResult, Mode, NodeType, Source, SourceMetadata,
};
use schemascope_engine::{GraphService, MemoryEngine};

use crate::*;

fn presenter_with(engine: Arc<MemoryEngine>, options: PresenterOptions) -> GraphPresenter {
    let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory())).with_engine(engine);
    GraphPresenter::new(
        Arc::new(LocalBackend::new(Arc::new(service))),
        GraphAdapter::default(),
        GraphRequest::new(Source::Postgres, Mode::Schema),
    )
    .with_options(options)
}

fn sales_presenter() -> (Arc<MemoryEngine>, GraphPresenter) {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres));
    (engine.clone(), presenter_with(engine, PresenterOptions::default()))
}

fn record_phases(presenter: &GraphPresenter) -> Arc<Mutex<Vec<Phase>>> {
    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&phases);
    presenter.subscribe(move |state| sink.lock().unwrap().push(state.phase));
    phases
}

/// Backend that always returns one fixed graph, valid or not.
struct StaticBackend {
    graph: GenericGraph,
    status_calls: AtomicUsize,
}

#[async_trait]
impl GraphBackend for StaticBackend {
    async fn get_graph(&self, _request: &GraphRequest, _use_cache: bool) -> Result<GraphResult, GraphError> {
        Ok(GraphResult {
            graph: self.graph.clone(),
            cache_used: false,
            metadata: SourceMetadata::default(),
            built_at: chrono::Utc::now(),
        })
    }

    async fn rebuild(&self, request: &GraphRequest) -> Result<GraphResult, GraphError> {
        self.get_graph(request, false).await
    }

    async fn clear_cache(&self, _filter: &CacheFilter) -> Result<usize, GraphError> {
        Err(GraphError::Cache(schemascope_core::CacheError::Unavailable("read-only".to_string())))
    }

    async fn status(&self, _request: &GraphRequest) -> Result<CacheStatus, GraphError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Err(GraphError::Internal("status endpoint down".to_string()))
    }
}

fn dangling_graph() -> GenericGraph {
    GenericGraph {
        nodes: vec![GenericNode::new("a", "a", NodeType::Table)],
        edges: vec![GenericEdge::new("a", "ghost", "fk", EdgeType::ForeignKey)],
    }
}

#[tokio::test]
async fn test_cold_load_then_warm_refresh() {
    let (_, presenter) = sales_presenter();
    let phases = record_phases(&presenter);
    assert_eq!(presenter.snapshot().phase, Phase::Idle);

    let loaded = assert_ok!(presenter.load_graph(true).await);
    assert_eq!(loaded.phase, Phase::Loaded);
    assert!(!loaded.loading);
    assert!(!loaded.cache_status.cached);
    assert_eq!(loaded.graph.as_ref().unwrap().nodes.len(), 5);
    assert_eq!(loaded.generic_graph.as_ref().unwrap().node_count(), 5);
    assert!(loaded.last_refresh.is_some());
    assert_eq!(*phases.lock().unwrap(), vec![Phase::Loading, Phase::Loaded]);

    let refreshed = assert_ok!(presenter.refresh().await);
    assert!(refreshed.cache_status.cached);
    assert_eq!(refreshed.cache_status.source_location, "memory://postgres");
    assert_eq!(presenter.snapshot(), refreshed);
}

#[tokio::test]
async fn test_rebuild_connection_error_is_recorded_and_returned() {
    let (engine, presenter) = sales_presenter();
    assert_ok!(presenter.load_graph(true).await);

    engine.set_failure(Some(GraphError::connection(Source::Postgres, "connection refused")));
    let err = assert_err!(presenter.rebuild().await);
    assert!(matches!(err, PresenterError::Graph(GraphError::Connection { .. })));

    let state = presenter.snapshot();
    assert_eq!(state.phase, Phase::Error);
    assert!(!state.loading);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("connection refused")));
    assert!(state.graph.is_none());
}

#[tokio::test]
async fn test_keep_graph_on_error_option() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres));
    let presenter = presenter_with(
        engine.clone(),
        PresenterOptions {
            keep_graph_on_error: true,
        },
    );
    assert_ok!(presenter.load_graph(true).await);
    engine.set_failure(Some(GraphError::connection(Source::Postgres, "down")));
    assert_err!(presenter.rebuild().await);

    let state = presenter.snapshot();
    assert_eq!(state.phase, Phase::Error);
    assert!(state.graph.is_some());
}

#[tokio::test]
async fn test_rebuild_never_reports_cached() {
    let (engine, presenter) = sales_presenter();
    assert_ok!(presenter.load_graph(true).await);
    let state = assert_ok!(presenter.rebuild().await);
    assert!(!state.cache_status.cached);
    assert_eq!(engine.list_calls(), 2);
}

#[tokio::test]
async fn test_invalid_graph_is_not_rendered() {
    let backend = Arc::new(StaticBackend {
        graph: dangling_graph(),
        status_calls: AtomicUsize::new(0),
    });
    let presenter = GraphPresenter::new(
        backend,
        GraphAdapter::default(),
        GraphRequest::new(Source::Catalog, Mode::Schema),
    );
    let err = assert_err!(presenter.load_graph(true).await);
    assert!(matches!(err, PresenterError::Graph(GraphError::Validation(_))));

    let state = presenter.snapshot();
    assert_eq!(state.phase, Phase::Error);
    assert!(state.graph.is_none());
    assert!(state.generic_graph.is_none());
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_block_others() {
    let (_, presenter) = sales_presenter();
    presenter.subscribe(|_| panic!("subscriber bug"));
    let phases = record_phases(&presenter);

    let state = assert_ok!(presenter.load_graph(true).await);
    assert_eq!(state.phase, Phase::Loaded);
    assert_eq!(phases.lock().unwrap().len(), 2);
    assert_eq!(presenter.snapshot().phase, Phase::Loaded);
}

#[tokio::test]
async fn test_unsubscribe_stops_notifications() {
    let (_, presenter) = sales_presenter();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let id = presenter.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_ok!(presenter.load_graph(true).await);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(presenter.unsubscribe(id));
    assert!(!presenter.unsubscribe(id));
    assert_ok!(presenter.refresh().await);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_overlapping_loads_keep_only_the_latest() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres).with_latency(Duration::from_millis(30)));
    let presenter = presenter_with(engine, PresenterOptions::default());

    let (first, second) = tokio::join!(presenter.load_graph(false), presenter.rebuild());
    assert_eq!(first.unwrap_err(), PresenterError::Superseded { sequence: 1 });
    let latest = assert_ok!(second);
    assert_eq!(latest.phase, Phase::Loaded);
    assert_eq!(presenter.snapshot(), latest);
}

#[tokio::test]
async fn test_clear_cache_and_reload() {
    let (engine, presenter) = sales_presenter();
    assert_ok!(presenter.load_graph(true).await);
    assert_ok!(presenter.refresh().await);
    assert_eq!(engine.list_calls(), 1);

    let state = assert_ok!(presenter.clear_cache_and_reload().await);
    assert!(!state.cache_status.cached);
    assert_eq!(engine.list_calls(), 2);
}

#[tokio::test]
async fn test_clear_failure_is_recorded() {
    let backend = Arc::new(StaticBackend {
        graph: GenericGraph::empty(),
        status_calls: AtomicUsize::new(0),
    });
    let presenter = GraphPresenter::new(
        backend,
        GraphAdapter::default(),
        GraphRequest::new(Source::Catalog, Mode::Schema),
    );
    let err = assert_err!(presenter.clear_cache_and_reload().await);
    assert_eq!(err.to_string(), "cache store unavailable: read-only");
    assert_eq!(presenter.snapshot().phase, Phase::Error);
}

#[tokio::test]
async fn test_update_status_swallows_failures() {
    let backend = Arc::new(StaticBackend {
        graph: GenericGraph::empty(),
        status_calls: AtomicUsize::new(0),
    });
    let presenter = GraphPresenter::new(
        backend.clone(),
        GraphAdapter::default(),
        GraphRequest::new(Source::Catalog, Mode::Schema),
    );
    let phases = record_phases(&presenter);
    presenter.update_status().await;

    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 1);
    assert_eq!(*presenter.snapshot(), PresenterState::default());
    assert!(phases.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_update_status_reports_cached() {
    let (_, presenter) = sales_presenter();
    presenter.update_status().await;
    assert!(!presenter.snapshot().cache_status.cached);

    assert_ok!(presenter.load_graph(true).await);
    presenter.update_status().await;
    let state = presenter.snapshot();
    assert!(state.cache_status.cached);
    assert_eq!(state.cache_status.source_file_count, 5);
}

#[tokio::test]
async fn test_empty_graph_is_an_explicit_empty_state() {
    let backend = Arc::new(StaticBackend {
        graph: GenericGraph::empty(),
        status_calls: AtomicUsize::new(0),
    });
    let presenter = GraphPresenter::new(
        backend,
        GraphAdapter::default(),
        GraphRequest::new(Source::Catalog, Mode::Data),
    );
    let state = assert_ok!(presenter.load_graph(true).await);
    assert_eq!(state.phase, Phase::Loaded);
    assert!(state.is_empty());
    assert!(state.graph.as_ref().unwrap().nodes.is_empty());
}

#[tokio::test]
async fn test_set_request_and_reset() {
    let (_, presenter) = sales_presenter();
    presenter.set_request(GraphRequest::new(Source::Postgres, Mode::Data));
    let state = assert_ok!(presenter.load_graph(true).await);
    assert_eq!(state.generic_graph.as_ref().unwrap().node_count(), 10);

    presenter.reset();
    assert_eq!(*presenter.snapshot(), PresenterState::default());
    assert_eq!(presenter.request().mode, Mode::Data);
}
