//! Unit tests for schemascope-engine module

use std::sync::Arc;
use std::time::Duration;

use schemascope_core::{
    CacheEntry, CacheError, CacheFilter, CacheKey, EdgeType, GraphCacheRepository, GraphError, GraphRequest,
    GraphStore, Mode, NodeType, Source,
};

use crate::*;

fn sales_service() -> (Arc<MemoryEngine>, GraphService) {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres));
    let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory())).with_engine(engine.clone());
    (engine, service)
}

fn schema_request() -> GraphRequest {
    GraphRequest::new(Source::Postgres, Mode::Schema)
}

fn data_request() -> GraphRequest {
    GraphRequest::new(Source::Postgres, Mode::Data)
}

/// A store whose every operation fails.
struct BrokenStore;

impl GraphStore for BrokenStore {
    fn get(&self, _key: &CacheKey) -> Result<Option<Arc<CacheEntry>>, CacheError> {
        Err(CacheError::Unavailable("disk on fire".to_string()))
    }

    fn put(&self, _entry: Arc<CacheEntry>) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("disk on fire".to_string()))
    }

    fn remove(&self, _filter: &CacheFilter) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("disk on fire".to_string()))
    }

    fn keys(&self) -> Result<Vec<CacheKey>, CacheError> {
        Err(CacheError::Unavailable("disk on fire".to_string()))
    }
}

#[tokio::test]
async fn test_schema_graph_of_sales_fixture() {
    let (_, service) = sales_service();
    let result = service.get_graph(&schema_request(), true).await.unwrap();
    let graph = result.graph;

    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.node("sales.order_totals").unwrap().node_type, NodeType::View);
    assert_eq!(graph.node("sales.clients").unwrap().node_type, NodeType::Synonym);

    let fk_count = graph.edges.iter().filter(|e| e.edge_type == EdgeType::ForeignKey).count();
    assert_eq!(fk_count, 2);
    assert!(graph.edges.iter().any(|e| e.source == "sales.order_totals"
        && e.target == "sales.orders"
        && e.edge_type == EdgeType::Contains));
    assert!(graph.edges.iter().any(|e| e.source == "sales.clients"
        && e.target == "sales.customers"
        && e.label == "alias of"));
}

#[tokio::test]
async fn test_data_graph_of_sales_fixture() {
    let (_, service) = sales_service();
    let graph = service.get_graph(&data_request(), true).await.unwrap().graph;

    // 3 customers + 2 products + 5 orders; the view has no rows
    assert_eq!(graph.nodes_of_type(NodeType::Record).count(), 10);
    // order 5 points at a customer that does not exist
    assert_eq!(graph.edge_count(), 9);
    assert!(graph.edges_from("sales.orders:5").all(|e| e.target == "sales.products:1"));
    assert_eq!(graph.node("sales.customers:1").unwrap().label, "customer 1");
}

#[tokio::test]
async fn test_max_records_per_table_caps_each_table() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres));
    let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory()))
        .with_engine(engine)
        .with_data_options(DataGraphOptions {
            max_records_per_table: 2,
            ..DataGraphOptions::default()
        });
    let graph = service.get_graph(&data_request(), true).await.unwrap().graph;

    let orders = graph
        .nodes
        .iter()
        .filter(|n| n.properties["_table"].to_string() == "sales.orders")
        .count();
    assert_eq!(orders, 2);
    assert_eq!(graph.node_count(), 6);
}

#[tokio::test]
async fn test_second_fetch_is_served_from_cache() {
    let (engine, service) = sales_service();
    let first = service.get_graph(&schema_request(), true).await.unwrap();
    let second = service.get_graph(&schema_request(), true).await.unwrap();

    assert!(!first.cache_used);
    assert!(second.cache_used);
    assert_eq!(first.graph, second.graph);
    assert_eq!(engine.list_calls(), 1);
}

#[tokio::test]
async fn test_default_scope_shares_the_cache_entry() {
    let (engine, service) = sales_service();
    service.get_graph(&schema_request(), true).await.unwrap();
    let explicit = service
        .get_graph(&schema_request().with_scope("sales"), true)
        .await
        .unwrap();
    assert!(explicit.cache_used);
    assert_eq!(engine.list_calls(), 1);
}

#[tokio::test]
async fn test_rebuild_bypasses_and_overwrites_cache() {
    let (engine, service) = sales_service();
    let first = service.get_graph(&schema_request(), true).await.unwrap();
    let rebuilt = service.rebuild(&schema_request()).await.unwrap();

    assert!(!rebuilt.cache_used);
    assert!(rebuilt.built_at >= first.built_at);
    assert_eq!(engine.list_calls(), 2);

    let cached = service.get_graph(&schema_request(), true).await.unwrap();
    assert_eq!(cached.built_at, rebuilt.built_at);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_build() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres).with_latency(Duration::from_millis(50)));
    let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory())).with_engine(engine.clone());

    let request = schema_request();
    let (a, b) = tokio::join!(service.get_graph(&request, true), service.get_graph(&request, true));

    assert_eq!(a.unwrap().graph, b.unwrap().graph);
    assert_eq!(engine.list_calls(), 1);
    assert_eq!(service.repository().inflight_count(), 0);
}

#[tokio::test]
async fn test_build_failure_reaches_caller_and_is_not_cached() {
    let (engine, service) = sales_service();
    engine.set_failure(Some(GraphError::connection(Source::Postgres, "refused")));

    let err = service.get_graph(&schema_request(), true).await.unwrap_err();
    assert_eq!(err.code(), "connection_failed");

    engine.set_failure(None);
    let result = service.get_graph(&schema_request(), true).await.unwrap();
    assert!(!result.cache_used);
}

#[tokio::test]
async fn test_unknown_scope_is_reported() {
    let (_, service) = sales_service();
    let err = service
        .get_graph(&schema_request().with_scope("archive"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::SchemaNotFound { ref scope, .. } if scope == "archive"));
}

#[tokio::test]
async fn test_unconfigured_source_is_unavailable() {
    let (_, service) = sales_service();
    let err = service
        .get_graph(&GraphRequest::new(Source::Catalog, Mode::Schema), true)
        .await
        .unwrap_err();
    assert_eq!(err, GraphError::SourceUnavailable(Source::Catalog));
}

#[tokio::test]
async fn test_slow_build_times_out() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres).with_latency(Duration::from_millis(200)));
    let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory()))
        .with_engine(engine)
        .with_build_timeout(Duration::from_millis(20));

    let err = service.get_graph(&schema_request(), true).await.unwrap_err();
    assert_eq!(err.code(), "timeout");
    assert_eq!(service.repository().inflight_count(), 0);
}

#[tokio::test]
async fn test_abandoned_request_still_fills_the_cache() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres).with_latency(Duration::from_millis(100)));
    let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory()))
        .with_engine(engine.clone())
        .with_build_timeout(Duration::from_millis(500));

    let abandoned = tokio::time::timeout(Duration::from_millis(20), service.get_graph(&schema_request(), true)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(service.repository().inflight_count(), 0);

    let result = service.get_graph(&schema_request(), true).await.unwrap();
    assert!(result.cache_used);
    assert_eq!(result.graph.node_count(), 5);
    assert_eq!(engine.list_calls(), 1);
}

#[tokio::test]
async fn test_status_of_unknown_scope_is_reported() {
    let (_, service) = sales_service();
    let err = service
        .status(&schema_request().with_scope("archive"))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::SchemaNotFound { ref scope, .. } if scope == "archive"));

    let status = service.status(&schema_request().with_scope("sales")).await.unwrap();
    assert!(!status.cached);
}

#[tokio::test]
async fn test_broken_cache_degrades_to_direct_build() {
    let engine = Arc::new(MemoryEngine::sales_fixture(Source::Postgres));
    let service =
        GraphService::new(Arc::new(GraphCacheRepository::new(Arc::new(BrokenStore)))).with_engine(engine.clone());

    let first = service.get_graph(&schema_request(), true).await.unwrap();
    let second = service.get_graph(&schema_request(), true).await.unwrap();
    assert!(!first.cache_used);
    assert!(!second.cache_used);
    assert_eq!(engine.list_calls(), 2);

    let status = service.status(&schema_request()).await.unwrap();
    assert!(!status.cached);
    assert!(service.clear_cache(&CacheFilter::all()).is_err());
}

#[tokio::test]
async fn test_status_and_clear_cache() {
    let (_, service) = sales_service();
    let before = service.status(&schema_request()).await.unwrap();
    assert!(!before.cached);
    assert_eq!(before.source_location, "memory://postgres");

    service.get_graph(&schema_request(), true).await.unwrap();
    service.get_graph(&data_request(), true).await.unwrap();
    assert!(service.status(&schema_request()).await.unwrap().cached);

    let key = service.resolve_key(&schema_request()).unwrap();
    assert_eq!(service.clear_cache(&CacheFilter::exact(&key)).unwrap(), 1);
    assert!(!service.status(&schema_request()).await.unwrap().cached);
    assert!(service.status(&data_request()).await.unwrap().cached);

    assert_eq!(service.clear_cache(&CacheFilter::all()).unwrap(), 1);
}

#[tokio::test]
async fn test_health_reports_each_source() {
    let (engine, service) = sales_service();
    let report = service.health().await;
    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.details["postgres"], "ok");

    engine.set_failure(Some(GraphError::connection(Source::Postgres, "refused")));
    let report = service.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert!(report.details["postgres"].contains("refused"));
}

#[test]
fn test_create_engines_from_config() {
    let config = schemascope_core::Config::from_toml("[catalog]\ndir = \"catalog\"\n").unwrap();
    let engines = create_engines(&config).unwrap();
    assert_eq!(engines.len(), 1);
    assert_eq!(engines[0].source(), Source::Catalog);
    assert_eq!(engines[0].default_scope(), "main");
}
