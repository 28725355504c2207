//! Query engine trait: the seam between graph builders and backing stores

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use schemascope_core::{GraphError, Scalar, Source, SourceMetadata};

/// One sampled row, column name to value.
pub type Row = BTreeMap<String, Scalar>;

/// A table, view or synonym as reported by the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub schema: String,
    pub name: String,
    /// Raw object type string, e.g. `BASE TABLE` or `VIEW`.
    pub entity_type: String,
    /// Primary-key columns in key order. Empty when the entity has none.
    pub primary_key: Vec<String>,
    /// Qualified names this entity reads from (views) or aliases (synonyms).
    pub depends_on: Vec<String>,
    pub column_count: Option<usize>,
}

impl Entity {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            entity_type: entity_type.into(),
            primary_key: Vec::new(),
            depends_on: Vec::new(),
            column_count: None,
        }
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_dependency(mut self, qualified_name: impl Into<String>) -> Self {
        self.depends_on.push(qualified_name.into());
        self
    }

    /// `schema.name`, the node id used in schema mode.
    pub fn qualified_name(&self) -> String {
        qualify(&self.schema, &self.name)
    }
}

/// One column pair of a foreign-key constraint. Composite constraints are
/// reported as several rows sharing `constraint`, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub constraint: String,
    /// Qualified referencing table.
    pub from_table: String,
    pub from_column: String,
    /// Qualified referenced table.
    pub to_table: String,
    pub to_column: String,
}

impl ForeignKey {
    pub fn new(
        constraint: impl Into<String>,
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            constraint: constraint.into(),
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }
}

/// Read-only access to one backing store.
///
/// Implementations must be safe to call concurrently; the service shares a
/// single engine across all requests for its source.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    fn source(&self) -> Source;

    /// Scope used when a request names none.
    fn default_scope(&self) -> &str;

    /// `Ok` if `scope` exists, `SchemaNotFound` otherwise. Cheaper than listing.
    async fn ensure_scope(&self, scope: &str) -> Result<(), GraphError>;

    /// Entities in `scope`. Fails with `SchemaNotFound` for an unknown scope.
    async fn list_entities(&self, scope: &str) -> Result<Vec<Entity>, GraphError>;

    async fn list_foreign_keys(&self, scope: &str) -> Result<Vec<ForeignKey>, GraphError>;

    /// At most `limit` rows of the qualified `table`.
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, GraphError>;

    async fn source_metadata(&self) -> Result<SourceMetadata, GraphError>;

    /// Cheap reachability check used by health reporting.
    async fn ping(&self) -> Result<(), GraphError>;

    /// A view that answers every call of one build from the same state.
    /// `None` when this engine is already consistent across calls.
    async fn snapshot(&self) -> Result<Option<Arc<dyn QueryEngine>>, GraphError> {
        Ok(None)
    }
}

pub fn qualify(schema: &str, name: &str) -> String {
    format!("{schema}.{name}")
}

/// Split `schema.name` at the first dot. Unqualified names get `default_schema`.
pub fn split_qualified<'a>(table: &'a str, default_schema: &'a str) -> (&'a str, &'a str) {
    match table.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => (default_schema, table),
    }
}

/// Convert a JSON object into a row, flattening nested values.
pub fn row_from_json(object: &serde_json::Map<String, serde_json::Value>) -> Row {
    object
        .iter()
        .map(|(column, value)| (column.clone(), Scalar::from_json(value)))
        .collect()
}
