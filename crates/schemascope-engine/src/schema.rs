//! Schema-mode builder: one node per entity, one edge per relationship

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use schemascope_core::{EdgeType, GenericEdge, GenericGraph, GenericNode, GraphError, NodeType};

use crate::engine::{Entity, ForeignKey, QueryEngine};

pub struct SchemaGraphBuilder {
    engine: Arc<dyn QueryEngine>,
}

impl SchemaGraphBuilder {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self { engine }
    }

    pub async fn build(&self, scope: &str) -> Result<GenericGraph, GraphError> {
        let entities = self.engine.list_entities(scope).await?;
        let foreign_keys = self.engine.list_foreign_keys(scope).await?;
        let graph = build_schema_graph(&entities, &foreign_keys);
        tracing::debug!(
            "Built schema graph for {}/{}: {} nodes, {} edges",
            self.engine.source(),
            scope,
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}

/// Assemble the schema graph.
///
/// Composite foreign keys collapse into one edge per constraint, labelled with
/// the referencing columns. Relationships to entities outside the listing
/// (another schema, or filtered out) are dropped.
pub fn build_schema_graph(entities: &[Entity], foreign_keys: &[ForeignKey]) -> GenericGraph {
    let mut nodes: Vec<GenericNode> = entities.iter().map(entity_node).collect();
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

    let mut edges = Vec::new();

    // (from_table, constraint) -> (to_table, columns in key order)
    let mut constraints: BTreeMap<(&str, &str), (&str, Vec<&str>)> = BTreeMap::new();
    for fk in foreign_keys {
        constraints
            .entry((fk.from_table.as_str(), fk.constraint.as_str()))
            .or_insert_with(|| (fk.to_table.as_str(), Vec::new()))
            .1
            .push(fk.from_column.as_str());
    }
    for ((from, constraint), (to, columns)) in constraints {
        if !known.contains(from) || !known.contains(to) {
            tracing::warn!("Dropping foreign key {} ({} -> {}): endpoint not in graph", constraint, from, to);
            continue;
        }
        edges.push(GenericEdge::new(from, to, columns.join(", "), EdgeType::ForeignKey));
    }

    for entity in entities {
        let relationship = match NodeType::from_engine_type(&entity.entity_type) {
            Some(NodeType::View) => Some(("selects from", EdgeType::Contains)),
            Some(NodeType::Synonym) => Some(("alias of", EdgeType::Association)),
            _ => None,
        };
        let Some((label, edge_type)) = relationship else {
            continue;
        };
        let from = entity.qualified_name();
        for target in &entity.depends_on {
            if known.contains(target.as_str()) {
                edges.push(GenericEdge::new(from.clone(), target.clone(), label, edge_type));
            } else {
                tracing::warn!("Dropping dependency {} -> {}: target not in graph", from, target);
            }
        }
    }

    edges.sort();
    GenericGraph::new(nodes, edges)
}

fn entity_node(entity: &Entity) -> GenericNode {
    let node_type = NodeType::from_engine_type(&entity.entity_type).unwrap_or_else(|| {
        tracing::debug!(
            "Unknown entity type '{}' for {}, treating as table",
            entity.entity_type,
            entity.qualified_name()
        );
        NodeType::Table
    });

    let mut node = GenericNode::new(entity.qualified_name(), entity.name.clone(), node_type)
        .with_property("schema", entity.schema.clone())
        .with_property("entityType", entity.entity_type.clone());
    if !entity.primary_key.is_empty() {
        node = node.with_property("primaryKey", entity.primary_key.join(", "));
    }
    if let Some(columns) = entity.column_count {
        node = node.with_property("columnCount", columns as i64);
    }
    node
}
