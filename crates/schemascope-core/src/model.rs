//! Core data structures for the generic graph

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::GenericGraph;

/// Which backing store a graph is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Live PostgreSQL catalog.
    Postgres,
    /// Directory of entity definition files.
    Catalog,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Postgres, Source::Catalog];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Postgres => "postgres",
            Source::Catalog => "catalog",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Source::Postgres),
            "catalog" => Ok(Source::Catalog),
            other => Err(GraphError::InvalidSource(other.to_string())),
        }
    }
}

/// Whether a graph shows structure or sampled rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Schema,
    Data,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Schema => "schema",
            Mode::Data => "data",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "schema" => Ok(Mode::Schema),
            "data" => Ok(Mode::Data),
            other => Err(GraphError::InvalidMode(other.to_string())),
        }
    }
}

/// Discriminates what kind of database object a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    // ── Structural ──────────────────────────────────────────
    Table,
    View,
    Synonym,

    // ── Sampled content ─────────────────────────────────────
    Record,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Table => "TABLE",
            NodeType::View => "VIEW",
            NodeType::Synonym => "SYNONYM",
            NodeType::Record => "RECORD",
        }
    }

    /// Map a backing store's object type string onto a node type.
    ///
    /// Accepts both the canonical names and the spellings used by
    /// `information_schema.tables.table_type`.
    pub fn from_engine_type(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "TABLE" | "BASE TABLE" | "FOREIGN" | "FOREIGN TABLE" | "PARTITIONED TABLE" => {
                Some(NodeType::Table)
            }
            "VIEW" | "MATERIALIZED VIEW" => Some(NodeType::View),
            "SYNONYM" | "ALIAS" => Some(NodeType::Synonym),
            "RECORD" => Some(NodeType::Record),
            _ => None,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Declared foreign-key constraint between two entities.
    ForeignKey,
    /// Instance-level link (record to record, synonym to target).
    Association,
    /// A view's definition reads from the target.
    Contains,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::ForeignKey => "FOREIGN_KEY",
            EdgeType::Association => "ASSOCIATION",
            EdgeType::Contains => "CONTAINS",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single property value attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Flatten a JSON value. Nested arrays and objects keep their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Scalar::Int(i),
                None => Scalar::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Scalar::Text(s.clone()),
            other => Scalar::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// A single node in the generic graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericNode {
    /// Unique within one graph.
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub properties: BTreeMap<String, Scalar>,
}

impl GenericNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed edge in the generic graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenericEdge {
    pub source: String,
    pub target: String,
    pub label: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

impl GenericEdge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<String>,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            label: label.into(),
            edge_type,
        }
    }
}

/// Identifies one cached graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub source: Source,
    pub mode: Mode,
    pub scope: Option<String>,
}

impl CacheKey {
    pub fn new(source: Source, mode: Mode, scope: Option<String>) -> Self {
        Self { source, mode, scope }
    }

    /// Filesystem-safe name, e.g. `postgres-schema-public`. Distinct keys
    /// always get distinct names: scope bytes other than lowercase ASCII
    /// letters, digits and `_` are written as `%XX`, which also keeps
    /// case-insensitive filesystems apart.
    pub fn file_stem(&self) -> String {
        match &self.scope {
            Some(scope) => {
                let mut encoded = String::with_capacity(scope.len());
                for byte in scope.bytes() {
                    if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'_' {
                        encoded.push(char::from(byte));
                    } else {
                        encoded.push_str(&format!("%{byte:02X}"));
                    }
                }
                format!("{}-{}-{}", self.source, self.mode, encoded)
            }
            None => format!("{}-{}", self.source, self.mode),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Some(scope) => write!(f, "{}/{}/{}", self.source, self.mode, scope),
            None => write!(f, "{}/{}", self.source, self.mode),
        }
    }
}

/// Selects cache entries to clear. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheFilter {
    pub source: Option<Source>,
    pub mode: Option<Mode>,
    pub scope: Option<String>,
}

impl CacheFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn exact(key: &CacheKey) -> Self {
        Self {
            source: Some(key.source),
            mode: Some(key.mode),
            scope: key.scope.clone(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.source.is_none() && self.mode.is_none() && self.scope.is_none()
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        self.source.is_none_or(|s| s == key.source)
            && self.mode.is_none_or(|m| m == key.mode)
            && self.scope.as_ref().is_none_or(|s| key.scope.as_ref() == Some(s))
    }
}

/// Where a graph's inputs came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub source_file_count: usize,
    pub source_location: String,
}

/// A stored graph. Replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub graph: GenericGraph,
    pub built_at: DateTime<Utc>,
    pub source_metadata: SourceMetadata,
}

impl CacheEntry {
    pub fn new(key: CacheKey, graph: GenericGraph, source_metadata: SourceMetadata) -> Self {
        Self {
            key,
            graph,
            built_at: Utc::now(),
            source_metadata,
        }
    }
}

/// What the view asks for: one (source, mode, scope) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRequest {
    pub source: Source,
    pub mode: Mode,
    pub scope: Option<String>,
}

impl GraphRequest {
    pub fn new(source: Source, mode: Mode) -> Self {
        Self {
            source,
            mode,
            scope: None,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn cache_filter(&self) -> CacheFilter {
        CacheFilter {
            source: Some(self.source),
            mode: Some(self.mode),
            scope: self.scope.clone(),
        }
    }
}

/// Response of a graph fetch or rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphResult {
    pub graph: GenericGraph,
    pub cache_used: bool,
    pub metadata: SourceMetadata,
    pub built_at: DateTime<Utc>,
}

impl GraphResult {
    pub fn from_entry(entry: &CacheEntry, cache_used: bool) -> Self {
        Self {
            graph: entry.graph.clone(),
            cache_used,
            metadata: entry.source_metadata.clone(),
            built_at: entry.built_at,
        }
    }
}

/// Lightweight cache metadata, no graph payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub cached: bool,
    pub source_file_count: usize,
    pub source_location: String,
}
