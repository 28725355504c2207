//! In-memory engine with scripted failures and latency
//!
//! Used by the test suites of every crate in the workspace, so it lives in
//! the library rather than behind `cfg(test)`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use schemascope_core::{GraphError, Scalar, Source, SourceMetadata};

use crate::engine::{Entity, ForeignKey, QueryEngine, Row};

pub struct MemoryEngine {
    source: Source,
    default_scope: String,
    entities: Vec<Entity>,
    foreign_keys: Vec<ForeignKey>,
    rows: HashMap<String, Vec<Row>>,
    latency: Duration,
    failure: Mutex<Option<GraphError>>,
    list_calls: AtomicUsize,
    sample_calls: AtomicUsize,
}

impl MemoryEngine {
    pub fn new(source: Source, default_scope: impl Into<String>) -> Self {
        Self {
            source,
            default_scope: default_scope.into(),
            entities: Vec::new(),
            foreign_keys: Vec::new(),
            rows: HashMap::new(),
            latency: Duration::ZERO,
            failure: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            sample_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_entity(mut self, entity: Entity, rows: Vec<Row>) -> Self {
        self.rows.insert(entity.qualified_name(), rows);
        self.entities.push(entity);
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every subsequent call fail with `error`, or succeed again on `None`.
    pub fn set_failure(&self, error: Option<GraphError>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = error;
        }
    }

    /// Number of `list_entities` calls, i.e. graph builds started.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<(), GraphError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn check_scope(&self, scope: &str) -> Result<(), GraphError> {
        if self.entities.iter().any(|e| e.schema == scope) {
            Ok(())
        } else {
            Err(GraphError::SchemaNotFound {
                store: self.source,
                scope: scope.to_string(),
            })
        }
    }

    /// Small shop schema in scope `sales`:
    ///
    /// - `customers` (3 rows), `products` (2 rows), `orders` (5 rows)
    /// - `orders.customer_id -> customers.id`, `orders.product_id -> products.id`
    /// - view `order_totals` selecting from `orders`
    /// - synonym `clients` aliasing `customers`
    pub fn sales_fixture(source: Source) -> Self {
        let customers = (1..=3i64)
            .map(|id| row(&[("id", Scalar::Int(id)), ("name", format!("customer {id}").into())]))
            .collect();
        let products = (1..=2i64)
            .map(|id| row(&[("id", Scalar::Int(id)), ("code", format!("P-{id}").into())]))
            .collect();
        // order 5 references customer 9, which does not exist
        let orders = [(1, 1, 1), (2, 1, 2), (3, 2, 1), (4, 3, 2), (5, 9, 1)]
            .into_iter()
            .map(|(id, customer, product)| {
                row(&[
                    ("id", Scalar::Int(id)),
                    ("customer_id", Scalar::Int(customer)),
                    ("product_id", Scalar::Int(product)),
                ])
            })
            .collect();

        MemoryEngine::new(source, "sales")
            .with_entity(
                Entity::new("sales", "customers", "BASE TABLE").with_primary_key(&["id"]),
                customers,
            )
            .with_entity(
                Entity::new("sales", "products", "BASE TABLE").with_primary_key(&["id"]),
                products,
            )
            .with_entity(
                Entity::new("sales", "orders", "BASE TABLE").with_primary_key(&["id"]),
                orders,
            )
            .with_entity(
                Entity::new("sales", "order_totals", "VIEW").with_dependency("sales.orders"),
                Vec::new(),
            )
            .with_entity(
                Entity::new("sales", "clients", "SYNONYM").with_dependency("sales.customers"),
                Vec::new(),
            )
            .with_foreign_key(ForeignKey::new(
                "orders_customer_fk",
                "sales.orders",
                "customer_id",
                "sales.customers",
                "id",
            ))
            .with_foreign_key(ForeignKey::new(
                "orders_product_fk",
                "sales.orders",
                "product_id",
                "sales.products",
                "id",
            ))
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row(values: &[(&str, Scalar)]) -> Row {
    values
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

#[async_trait]
impl QueryEngine for MemoryEngine {
    fn source(&self) -> Source {
        self.source
    }

    fn default_scope(&self) -> &str {
        &self.default_scope
    }

    async fn ensure_scope(&self, scope: &str) -> Result<(), GraphError> {
        self.enter().await?;
        self.check_scope(scope)
    }

    async fn list_entities(&self, scope: &str) -> Result<Vec<Entity>, GraphError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.check_scope(scope)?;
        Ok(self.entities.iter().filter(|e| e.schema == scope).cloned().collect())
    }

    async fn list_foreign_keys(&self, scope: &str) -> Result<Vec<ForeignKey>, GraphError> {
        self.enter().await?;
        self.check_scope(scope)?;
        let prefix = format!("{scope}.");
        Ok(self
            .foreign_keys
            .iter()
            .filter(|fk| fk.from_table.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, GraphError> {
        self.sample_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.rows
            .get(table)
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .ok_or_else(|| GraphError::InvalidRequest(format!("unknown table '{table}'")))
    }

    async fn source_metadata(&self) -> Result<SourceMetadata, GraphError> {
        self.enter().await?;
        Ok(SourceMetadata {
            source_file_count: self.entities.len(),
            source_location: format!("memory://{}", self.source),
        })
    }

    async fn ping(&self) -> Result<(), GraphError> {
        self.enter().await
    }
}
