//! End-to-end tests for Schemascope
//!
//! These boot the HTTP API on an ephemeral port over a catalog directory and
//! drive it the way the CLI does, through the presenter and its HTTP backend.

use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use schemascope_core::{CacheFilter, GraphAdapter, GraphCacheRepository, GraphRequest, Mode, Source};
use schemascope_engine::{CatalogEngine, GraphService};
use schemascope_presenter::{GraphBackend, GraphPresenter, HttpBackend, Phase};
use schemascope_server::{SchemascopeServer, ServerConfig, ServerState};

const CUSTOMERS: &str = r#"
name: customers
primary_key: [id]
rows:
  - { id: 1, name: Ada }
  - { id: 2, name: Grace }
"#;

const ORDERS: &str = r#"{
  "name": "orders",
  "primary_key": ["id"],
  "foreign_keys": [
    { "columns": ["customer_id"], "references": { "table": "customers", "columns": ["id"] } }
  ],
  "rows": [
    { "id": 10, "customer_id": 1 },
    { "id": 11, "customer_id": 2 },
    { "id": 12, "customer_id": 1 }
  ]
}"#;

const ORDER_SUMMARY: &str = r#"
name: order_summary
type: view
depends_on: [orders]
"#;

struct TestServer {
    base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
    _catalog: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let catalog = TempDir::new().unwrap();
        std::fs::write(catalog.path().join("customers.yaml"), CUSTOMERS).unwrap();
        std::fs::write(catalog.path().join("orders.json"), ORDERS).unwrap();
        std::fs::write(catalog.path().join("order_summary.yml"), ORDER_SUMMARY).unwrap();

        let service = GraphService::new(Arc::new(GraphCacheRepository::in_memory()))
            .with_engine(Arc::new(CatalogEngine::new(catalog.path(), "main")));
        let state = Arc::new(ServerState::new(Arc::new(service), Source::Catalog));
        let server = SchemascopeServer::new(
            state,
            ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
        );

        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async {
            let _ = rx.await;
        }));

        Self {
            base_url: format!("http://{addr}"),
            shutdown: Some(tx),
            handle,
            _catalog: catalog,
        }
    }

    fn backend(&self) -> Arc<HttpBackend> {
        Arc::new(HttpBackend::new(self.base_url.clone()))
    }

    async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        assert_ok!(self.handle.await.unwrap());
    }
}

/// Test that a presenter loads through the API and the second load is cached
#[tokio::test]
async fn test_presenter_over_http() {
    let server = TestServer::start().await;
    let presenter = GraphPresenter::new(
        server.backend(),
        GraphAdapter::default(),
        GraphRequest::new(Source::Catalog, Mode::Schema),
    );

    let first = assert_ok!(presenter.load_graph(true).await);
    assert_eq!(first.phase, Phase::Loaded);
    assert!(!first.cache_status.cached);
    assert_eq!(first.cache_status.source_file_count, 3);

    let graph = first.generic_graph.as_ref().unwrap();
    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.node("main.order_summary").is_some());
    assert_eq!(first.graph.as_ref().unwrap().nodes.len(), 3);

    let second = assert_ok!(presenter.refresh().await);
    assert!(second.cache_status.cached);

    let rebuilt = assert_ok!(presenter.rebuild().await);
    assert!(!rebuilt.cache_status.cached);

    server.stop().await;
}

/// Test that data mode links sampled rows through foreign keys
#[tokio::test]
async fn test_data_graph_over_http() {
    let server = TestServer::start().await;
    let backend = server.backend();

    let result = assert_ok!(
        backend
            .get_graph(&GraphRequest::new(Source::Catalog, Mode::Data), true)
            .await
    );
    assert_eq!(result.graph.node_count(), 5);
    assert_eq!(result.graph.edge_count(), 3);
    assert!(result.graph.node("main.orders:10").is_some());
    assert!(result.graph.node("main.customers:1").is_some());

    server.stop().await;
}

/// Test that server error codes survive the trip to the presenter
#[tokio::test]
async fn test_errors_keep_their_codes() {
    let server = TestServer::start().await;
    let presenter = GraphPresenter::new(
        server.backend(),
        GraphAdapter::default(),
        GraphRequest::new(Source::Catalog, Mode::Schema).with_scope("missing"),
    );

    let err = assert_err!(presenter.load_graph(true).await);
    assert!(err.to_string().starts_with("scope_not_found"));
    let state = presenter.snapshot();
    assert_eq!(state.phase, Phase::Error);
    assert!(state.graph.is_none());

    // postgres is not configured on this server
    let err = assert_err!(
        server
            .backend()
            .get_graph(&GraphRequest::new(Source::Postgres, Mode::Schema), true)
            .await
    );
    assert_eq!(err.code(), "source_unavailable");

    let response = reqwest::get(format!("{}/graph?source=catalog&mode=sideways", server.base_url))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_mode");

    server.stop().await;
}

/// Test cache clearing and status through the API
#[tokio::test]
async fn test_clear_and_status() {
    let server = TestServer::start().await;
    let backend = server.backend();
    let request = GraphRequest::new(Source::Catalog, Mode::Schema);

    assert!(!assert_ok!(backend.status(&request).await).cached);
    assert_ok!(backend.get_graph(&request, true).await);
    assert_ok!(
        backend
            .get_graph(&GraphRequest::new(Source::Catalog, Mode::Data), true)
            .await
    );
    assert!(assert_ok!(backend.status(&request).await).cached);

    let removed = assert_ok!(backend.clear_cache(&request.cache_filter()).await);
    assert_eq!(removed, 1);
    assert!(!assert_ok!(backend.status(&request).await).cached);

    let removed = assert_ok!(backend.clear_cache(&CacheFilter::all()).await);
    assert_eq!(removed, 1);

    let health: serde_json::Value = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    server.stop().await;
}

/// Test that the shipped example config and demo catalog work together
#[tokio::test]
async fn test_example_config_and_demo_catalog() {
    use schemascope_core::Config;
    use schemascope_presenter::LocalBackend;

    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let mut config = assert_ok!(Config::from_file(&root.join("schemascope.example.toml")));
    assert_ok!(config.validate());
    assert_eq!(config.default_source(), Some(Source::Catalog));

    let catalog = config.catalog.as_mut().unwrap();
    assert_eq!(catalog.default_scope, "shop");
    catalog.dir = root.join(&catalog.dir);

    let service = assert_ok!(GraphService::from_config(&config));
    let presenter = GraphPresenter::new(
        Arc::new(LocalBackend::new(Arc::new(service))),
        GraphAdapter::new(config.theme(), config.adapter),
        GraphRequest::new(Source::Catalog, Mode::Schema),
    );

    let schema = assert_ok!(presenter.load_graph(true).await);
    let graph = schema.generic_graph.as_ref().unwrap();
    assert_eq!(graph.node_count(), 6);
    assert_eq!(graph.edge_count(), 7);

    presenter.set_request(GraphRequest::new(Source::Catalog, Mode::Data));
    let data = assert_ok!(presenter.load_graph(true).await);
    assert_eq!(data.generic_graph.as_ref().unwrap().node_count(), 12);
    assert_eq!(data.graph.as_ref().unwrap().nodes.len(), 12);
}
