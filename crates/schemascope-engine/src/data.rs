//! Data-mode builder: sampled rows as record nodes, linked through foreign keys

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use schemascope_core::config::{BuildSection, DEFAULT_MAX_RECORDS_PER_TABLE, DEFAULT_SAMPLE_CONCURRENCY};
use schemascope_core::{
    EdgeType, GenericEdge, GenericGraph, GenericNode, GraphError, NodeType, Scalar, TABLE_PROPERTY,
};

use crate::engine::{Entity, ForeignKey, QueryEngine, Row};

/// Columns tried, in order, for a record's display label.
const LABEL_COLUMNS: [&str; 4] = ["name", "title", "label", "code"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataGraphOptions {
    pub max_records_per_table: usize,
    /// Drop records that end up with no edges.
    pub filter_orphans: bool,
    pub sample_concurrency: usize,
}

impl Default for DataGraphOptions {
    fn default() -> Self {
        Self {
            max_records_per_table: DEFAULT_MAX_RECORDS_PER_TABLE,
            filter_orphans: false,
            sample_concurrency: DEFAULT_SAMPLE_CONCURRENCY,
        }
    }
}

impl From<&BuildSection> for DataGraphOptions {
    fn from(section: &BuildSection) -> Self {
        Self {
            max_records_per_table: section.max_records_per_table,
            filter_orphans: section.filter_orphans,
            sample_concurrency: section.sample_concurrency,
        }
    }
}

/// Rows sampled from one table.
#[derive(Debug, Clone)]
pub struct TableSample {
    pub entity: Entity,
    pub rows: Vec<Row>,
}

pub struct DataGraphBuilder {
    engine: Arc<dyn QueryEngine>,
    options: DataGraphOptions,
}

impl DataGraphBuilder {
    pub fn new(engine: Arc<dyn QueryEngine>, options: DataGraphOptions) -> Self {
        Self { engine, options }
    }

    pub async fn build(&self, scope: &str) -> Result<GenericGraph, GraphError> {
        let entities = self.engine.list_entities(scope).await?;
        let foreign_keys = self.engine.list_foreign_keys(scope).await?;

        let mut sampleable: Vec<Entity> = entities
            .into_iter()
            .filter(|e| {
                matches!(
                    NodeType::from_engine_type(&e.entity_type),
                    Some(NodeType::Table) | Some(NodeType::View) | None
                )
            })
            .collect();
        sampleable.sort_by_key(|e| e.qualified_name());

        let limit = self.options.max_records_per_table;
        let samples: Vec<Result<TableSample, GraphError>> = stream::iter(sampleable)
            .map(|entity| {
                let engine = Arc::clone(&self.engine);
                async move {
                    let mut rows = engine.sample_rows(&entity.qualified_name(), limit).await?;
                    rows.truncate(limit);
                    Ok(TableSample { entity, rows })
                }
            })
            .buffered(self.options.sample_concurrency.max(1))
            .collect()
            .await;
        let samples = samples.into_iter().collect::<Result<Vec<_>, _>>()?;

        let graph = build_data_graph(&samples, &foreign_keys, self.options.filter_orphans);
        tracing::debug!(
            "Built data graph for {}/{}: {} records from {} tables, {} links",
            self.engine.source(),
            scope,
            graph.node_count(),
            samples.len(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Maps (table, key columns, key values) to the record node holding them.
///
/// Built lazily per referenced column set, since a foreign key may target a
/// unique key other than the primary key.
#[derive(Debug, Default)]
pub struct RecordIndex {
    by_columns: HashMap<(String, Vec<String>), HashMap<Vec<String>, String>>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every record of `table` on `columns`. A record missing any of
    /// the columns, or holding null in one, is not indexed.
    pub fn index_table(&mut self, table: &str, columns: &[String], records: &[(String, &Row)]) {
        let key = (table.to_string(), columns.to_vec());
        if self.by_columns.contains_key(&key) {
            return;
        }
        let mut entries = HashMap::with_capacity(records.len());
        for (id, row) in records {
            if let Some(values) = key_values(row, columns) {
                entries.entry(values).or_insert_with(|| id.clone());
            }
        }
        self.by_columns.insert(key, entries);
    }

    pub fn lookup(&self, table: &str, columns: &[String], values: &[String]) -> Option<&str> {
        self.by_columns
            .get(&(table.to_string(), columns.to_vec()))?
            .get(values)
            .map(String::as_str)
    }
}

/// Display strings of `columns` in `row`, or `None` if any is missing or null.
fn key_values(row: &Row, columns: &[String]) -> Option<Vec<String>> {
    columns
        .iter()
        .map(|column| match row.get(column) {
            Some(value) if !value.is_null() => Some(value.to_string()),
            _ => None,
        })
        .collect()
}

/// Node id of a sampled row: `table:pk1,pk2`, or `table#ordinal` when the
/// table has no usable primary key. Backslashes and commas inside key
/// values are backslash-escaped, so distinct composite keys never share an id.
pub fn record_id(entity: &Entity, row: &Row, ordinal: usize) -> String {
    let table = entity.qualified_name();
    match (!entity.primary_key.is_empty())
        .then(|| key_values(row, &entity.primary_key))
        .flatten()
    {
        Some(values) => {
            let escaped: Vec<String> = values.iter().map(|v| escape_key_value(v)).collect();
            format!("{}:{}", table, escaped.join(","))
        }
        None => format!("{table}#{ordinal}"),
    }
}

fn escape_key_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == ',' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn record_label(entity: &Entity, row: &Row, id: &str) -> String {
    for column in LABEL_COLUMNS {
        if let Some(value) = row.get(column).filter(|v| !v.is_null()) {
            return value.to_string();
        }
    }
    let table = entity.qualified_name();
    let suffix = id.strip_prefix(&table).unwrap_or(id);
    format!("{}{}", entity.name, suffix)
}

/// Assemble the data graph from already-sampled tables.
pub fn build_data_graph(samples: &[TableSample], foreign_keys: &[ForeignKey], filter_orphans: bool) -> GenericGraph {
    let mut nodes = Vec::new();
    let mut records: HashMap<String, Vec<(String, &Row)>> = HashMap::new();

    for sample in samples {
        let table = sample.entity.qualified_name();
        let mut ids = Vec::with_capacity(sample.rows.len());
        for (ordinal, row) in sample.rows.iter().enumerate() {
            let id = record_id(&sample.entity, row, ordinal);
            let mut node = GenericNode::new(id.clone(), record_label(&sample.entity, row, &id), NodeType::Record);
            node.properties = row.clone();
            node.properties.insert(TABLE_PROPERTY.to_string(), Scalar::Text(table.clone()));
            nodes.push(node);
            ids.push((id, row));
        }
        records.insert(table, ids);
    }

    // (from_table, constraint) -> (to_table, from columns, to columns)
    let mut constraints: BTreeMap<(&str, &str), (&str, Vec<String>, Vec<String>)> = BTreeMap::new();
    for fk in foreign_keys {
        let entry = constraints
            .entry((fk.from_table.as_str(), fk.constraint.as_str()))
            .or_insert_with(|| (fk.to_table.as_str(), Vec::new(), Vec::new()));
        entry.1.push(fk.from_column.clone());
        entry.2.push(fk.to_column.clone());
    }

    let mut index = RecordIndex::new();
    let mut edges = Vec::new();
    for ((from_table, _), (to_table, from_columns, to_columns)) in &constraints {
        let (Some(sources), Some(targets)) = (records.get(*from_table), records.get(*to_table)) else {
            continue;
        };
        index.index_table(to_table, to_columns, targets);
        let label = from_columns.join(", ");
        for (source_id, row) in sources {
            let Some(values) = key_values(row, from_columns) else {
                continue;
            };
            // target rows that were not sampled have no node to link to
            if let Some(target_id) = index.lookup(to_table, to_columns, &values) {
                edges.push(GenericEdge::new(
                    source_id.clone(),
                    target_id,
                    label.clone(),
                    EdgeType::Association,
                ));
            }
        }
    }

    edges.sort();
    let graph = GenericGraph::new(nodes, edges);
    if filter_orphans { graph.without_orphans() } else { graph }
}
