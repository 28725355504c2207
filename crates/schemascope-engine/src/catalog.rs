//! File catalog engine: a directory of JSON/YAML entity definitions
//!
//! Each file describes one entity:
//!
//! ```yaml
//! schema: sales            # optional, defaults to the catalog's default scope
//! name: orders
//! type: table              # table | view | synonym
//! primary_key: [id]
//! foreign_keys:
//!   - name: orders_customer_fk
//!     columns: [customer_id]
//!     references: { table: customers, columns: [id] }
//! depends_on: []           # views and synonyms
//! rows:
//!   - { id: 1, customer_id: 7 }
//! ```
//!
//! Each build reads the directory once through [`CatalogEngine::load`], so a
//! rebuild sees edited files and a single build sees one consistent version.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::Deserialize;

use schemascope_core::config::CatalogSection;
use schemascope_core::{GraphError, Source, SourceMetadata};

use crate::engine::{Entity, ForeignKey, QueryEngine, Row, qualify, row_from_json, split_qualified};

const ENTITY_FILE_PATTERNS: [&str; 3] = ["*.json", "*.yaml", "*.yml"];

#[derive(Debug, Deserialize)]
struct EntityFile {
    #[serde(default)]
    schema: Option<String>,
    name: String,
    #[serde(rename = "type", default = "default_entity_type")]
    entity_type: String,
    #[serde(default)]
    primary_key: Vec<String>,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKeyFile>,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    rows: Vec<serde_json::Map<String, serde_json::Value>>,
}

fn default_entity_type() -> String {
    "table".to_string()
}

#[derive(Debug, Deserialize)]
struct ForeignKeyFile {
    #[serde(default)]
    name: Option<String>,
    columns: Vec<String>,
    references: ReferenceFile,
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    table: String,
    columns: Vec<String>,
}

/// One parsed entity with its foreign keys and rows, names fully qualified.
#[derive(Debug, Clone)]
struct CatalogEntity {
    entity: Entity,
    foreign_keys: Vec<ForeignKey>,
    rows: Vec<Row>,
}

/// Snapshot of the catalog directory.
#[derive(Debug, Clone, Default)]
struct Catalog {
    file_count: usize,
    entities: Vec<CatalogEntity>,
}

impl Catalog {
    fn in_scope<'a>(&'a self, scope: &'a str) -> impl Iterator<Item = &'a CatalogEntity> + 'a {
        self.entities.iter().filter(move |e| e.entity.schema == scope)
    }
}

pub struct CatalogEngine {
    dir: PathBuf,
    default_scope: String,
}

impl CatalogEngine {
    pub fn new(dir: impl Into<PathBuf>, default_scope: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            default_scope: default_scope.into(),
        }
    }

    pub fn from_config(section: &CatalogSection) -> Self {
        Self::new(section.dir.clone(), section.default_scope.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parse the directory once. The result answers every query from memory.
    pub async fn load(&self) -> Result<CatalogSnapshot, GraphError> {
        let dir = self.dir.clone();
        let default_scope = self.default_scope.clone();
        let catalog = tokio::task::spawn_blocking(move || load_catalog(&dir, &default_scope))
            .await
            .map_err(|e| GraphError::Internal(format!("catalog loader panicked: {e}")))??;
        Ok(CatalogSnapshot {
            catalog,
            location: self.dir.display().to_string(),
            default_scope: self.default_scope.clone(),
        })
    }
}

#[async_trait]
impl QueryEngine for CatalogEngine {
    fn source(&self) -> Source {
        Source::Catalog
    }

    fn default_scope(&self) -> &str {
        &self.default_scope
    }

    async fn ensure_scope(&self, scope: &str) -> Result<(), GraphError> {
        self.load().await?.ensure_scope(scope).await
    }

    async fn list_entities(&self, scope: &str) -> Result<Vec<Entity>, GraphError> {
        self.load().await?.list_entities(scope).await
    }

    async fn list_foreign_keys(&self, scope: &str) -> Result<Vec<ForeignKey>, GraphError> {
        self.load().await?.list_foreign_keys(scope).await
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, GraphError> {
        self.load().await?.sample_rows(table, limit).await
    }

    async fn source_metadata(&self) -> Result<SourceMetadata, GraphError> {
        self.load().await?.source_metadata().await
    }

    async fn ping(&self) -> Result<(), GraphError> {
        if self.dir.is_dir() {
            Ok(())
        } else {
            Err(missing_dir(&self.dir))
        }
    }

    /// One parse per build, so a build never mixes two versions of an edited file.
    async fn snapshot(&self) -> Result<Option<Arc<dyn QueryEngine>>, GraphError> {
        Ok(Some(Arc::new(self.load().await?)))
    }
}

/// The catalog directory as it was when [`CatalogEngine::load`] ran.
pub struct CatalogSnapshot {
    catalog: Catalog,
    location: String,
    default_scope: String,
}

impl CatalogSnapshot {
    pub fn entity_count(&self) -> usize {
        self.catalog.entities.len()
    }
}

#[async_trait]
impl QueryEngine for CatalogSnapshot {
    fn source(&self) -> Source {
        Source::Catalog
    }

    fn default_scope(&self) -> &str {
        &self.default_scope
    }

    async fn ensure_scope(&self, scope: &str) -> Result<(), GraphError> {
        if self.catalog.in_scope(scope).next().is_none() {
            return Err(GraphError::SchemaNotFound {
                store: Source::Catalog,
                scope: scope.to_string(),
            });
        }
        Ok(())
    }

    async fn list_entities(&self, scope: &str) -> Result<Vec<Entity>, GraphError> {
        self.ensure_scope(scope).await?;
        Ok(self.catalog.in_scope(scope).map(|e| e.entity.clone()).collect())
    }

    async fn list_foreign_keys(&self, scope: &str) -> Result<Vec<ForeignKey>, GraphError> {
        self.ensure_scope(scope).await?;
        Ok(self
            .catalog
            .in_scope(scope)
            .flat_map(|e| e.foreign_keys.iter().cloned())
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, GraphError> {
        let (schema, name) = split_qualified(table, &self.default_scope);
        let qualified = qualify(schema, name);
        self.catalog
            .entities
            .iter()
            .find(|e| e.entity.qualified_name() == qualified)
            .map(|e| e.rows.iter().take(limit).cloned().collect())
            .ok_or_else(|| GraphError::InvalidRequest(format!("unknown table '{table}'")))
    }

    async fn source_metadata(&self) -> Result<SourceMetadata, GraphError> {
        Ok(SourceMetadata {
            source_file_count: self.catalog.file_count,
            source_location: self.location.clone(),
        })
    }

    async fn ping(&self) -> Result<(), GraphError> {
        Ok(())
    }
}

fn missing_dir(dir: &Path) -> GraphError {
    GraphError::connection(
        Source::Catalog,
        format!("catalog directory {} does not exist", dir.display()),
    )
}

fn entity_globs() -> Result<GlobSet, GraphError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in ENTITY_FILE_PATTERNS {
        let glob = Glob::new(pattern).map_err(|e| GraphError::Internal(e.to_string()))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| GraphError::Internal(e.to_string()))
}

/// Walk `dir`, parse every entity file, and qualify names. Unparseable files
/// are skipped with a warning so that one bad file does not hide the rest.
fn load_catalog(dir: &Path, default_scope: &str) -> Result<Catalog, GraphError> {
    if !dir.is_dir() {
        return Err(missing_dir(dir));
    }
    let globs = entity_globs()?;

    let mut paths: Vec<PathBuf> = WalkBuilder::new(dir)
        .hidden(true)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
        .filter(|path| path.file_name().is_some_and(|name| globs.is_match(name)))
        .collect();
    paths.sort();

    let mut catalog = Catalog {
        file_count: paths.len(),
        entities: Vec::with_capacity(paths.len()),
    };
    for path in &paths {
        match parse_entity_file(path) {
            Ok(file) => catalog.entities.push(qualify_entity(file, default_scope)),
            Err(message) => tracing::warn!("Skipping catalog file {}: {}", path.display(), message),
        }
    }

    tracing::debug!(
        "Loaded {} entities from {} catalog files in {}",
        catalog.entities.len(),
        catalog.file_count,
        dir.display()
    );
    Ok(catalog)
}

fn parse_entity_file(path: &Path) -> Result<EntityFile, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    if is_json {
        serde_json::from_str(&text).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&text).map_err(|e| e.to_string())
    }
}

fn qualify_entity(file: EntityFile, default_scope: &str) -> CatalogEntity {
    let schema = file.schema.unwrap_or_else(|| default_scope.to_string());
    let qualified = qualify(&schema, &file.name);
    let in_schema = |table: &str| {
        let (s, n) = split_qualified(table, &schema);
        qualify(s, n)
    };

    let mut foreign_keys = Vec::new();
    for (index, fk) in file.foreign_keys.iter().enumerate() {
        if fk.columns.len() != fk.references.columns.len() {
            tracing::warn!(
                "Foreign key {} of {} pairs {} columns with {}, ignoring it",
                index,
                qualified,
                fk.columns.len(),
                fk.references.columns.len()
            );
            continue;
        }
        let constraint = fk
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}_fkey", file.name, fk.columns.join("_")));
        let target = in_schema(&fk.references.table);
        for (from_column, to_column) in fk.columns.iter().zip(&fk.references.columns) {
            foreign_keys.push(ForeignKey::new(
                constraint.clone(),
                qualified.clone(),
                from_column.clone(),
                target.clone(),
                to_column.clone(),
            ));
        }
    }

    let rows: Vec<Row> = file.rows.iter().map(row_from_json).collect();
    let column_count = if file.columns.is_empty() {
        rows.first().map(|row| row.len())
    } else {
        Some(file.columns.len())
    };

    CatalogEntity {
        entity: Entity {
            depends_on: file.depends_on.iter().map(|d| in_schema(d)).collect(),
            schema,
            name: file.name,
            entity_type: file.entity_type,
            primary_key: file.primary_key,
            column_count,
        },
        foreign_keys,
        rows,
    }
}
