//! Generic graph -> render graph adapter
//!
//! Pure and synchronous: no I/O, no clocks, no randomness. The output shape
//! follows vis-network's node/edge options, but nothing here depends on a
//! rendering library.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::graph::GenericGraph;
use crate::model::{GenericEdge, GenericNode, NodeType, Scalar};
use crate::style::{table_color, StyleTheme};

/// Property carrying a record's owning table.
pub const TABLE_PROPERTY: &str = "_table";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderColor {
    pub background: String,
    pub border: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFont {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderNode {
    pub id: String,
    pub label: String,
    /// Hover tooltip.
    pub title: String,
    pub group: String,
    pub shape: String,
    pub color: RenderColor,
    pub size: u32,
    pub font: RenderFont,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderEdgeColor {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: String,
    pub title: String,
    pub arrows: String,
    pub color: RenderEdgeColor,
    pub dashes: bool,
    pub width: u32,
}

/// Style-decorated graph, owned by whoever called the adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderGraph {
    pub nodes: Vec<RenderNode>,
    pub edges: Vec<RenderEdge>,
}

/// Data-mode hints consumed at styling time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Group records by their table instead of by node type.
    pub cluster_by_table: bool,
    /// Colour records from the table palette.
    pub color_by_table: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GraphAdapter {
    theme: StyleTheme,
    options: AdapterOptions,
}

impl GraphAdapter {
    pub fn new(theme: StyleTheme, options: AdapterOptions) -> Self {
        Self { theme, options }
    }

    pub fn theme(&self) -> &StyleTheme {
        &self.theme
    }

    /// Reject graphs with missing or duplicate node ids, or edges whose
    /// endpoints do not exist.
    pub fn validate_graph(&self, graph: &GenericGraph) -> Result<(), GraphError> {
        validate_graph(graph)
    }

    /// Validate, then convert. A validation failure produces no output.
    pub fn adapt(&self, graph: &GenericGraph) -> Result<RenderGraph, GraphError> {
        self.validate_graph(graph)?;
        Ok(self.convert_to_vis_js(graph))
    }

    /// Decorate every node and edge with its type's style and a tooltip.
    pub fn convert_to_vis_js(&self, graph: &GenericGraph) -> RenderGraph {
        let nodes = graph.nodes.iter().map(|n| self.render_node(n)).collect();
        let edges = graph
            .edges
            .iter()
            .enumerate()
            .map(|(index, e)| self.render_edge(index, e))
            .collect();
        RenderGraph { nodes, edges }
    }

    fn render_node(&self, node: &GenericNode) -> RenderNode {
        let style = self.theme.node_style(node.node_type.as_str());
        let table = match node.properties.get(TABLE_PROPERTY) {
            Some(Scalar::Text(table)) if node.node_type == NodeType::Record => Some(table.as_str()),
            _ => None,
        };

        let group = match table {
            Some(table) if self.options.cluster_by_table => table.to_string(),
            _ => node.node_type.as_str().to_string(),
        };
        let background = match table {
            Some(table) if self.options.color_by_table => table_color(table).to_string(),
            _ => style.background,
        };

        RenderNode {
            id: node.id.clone(),
            label: node.label.clone(),
            title: node_tooltip(node),
            group,
            shape: style.shape,
            color: RenderColor {
                background,
                border: style.border,
            },
            size: style.size,
            font: RenderFont {
                color: style.font_color,
            },
        }
    }

    fn render_edge(&self, index: usize, edge: &GenericEdge) -> RenderEdge {
        let style = self.theme.edge_style(edge.edge_type.as_str());
        RenderEdge {
            id: format!("{}->{}#{}", edge.source, edge.target, index),
            from: edge.source.clone(),
            to: edge.target.clone(),
            label: edge.label.clone(),
            title: format!(
                "{}\nType: {}\n{} -> {}",
                edge.label, edge.edge_type, edge.source, edge.target
            ),
            arrows: style.arrows,
            color: RenderEdgeColor { color: style.color },
            dashes: style.dashes,
            width: style.width,
        }
    }
}

/// See [`GraphAdapter::validate_graph`].
pub fn validate_graph(graph: &GenericGraph) -> Result<(), GraphError> {
    let mut ids = HashSet::with_capacity(graph.nodes.len());
    for (index, node) in graph.nodes.iter().enumerate() {
        if node.id.trim().is_empty() {
            return Err(GraphError::Validation(format!(
                "node at index {index} ('{}') has no id",
                node.label
            )));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(GraphError::Validation(format!("duplicate node id '{}'", node.id)));
        }
    }
    for edge in &graph.edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                return Err(GraphError::Validation(format!(
                    "edge {} -> {} references unknown node '{}'",
                    edge.source, edge.target, endpoint
                )));
            }
        }
    }
    Ok(())
}

fn node_tooltip(node: &GenericNode) -> String {
    let mut title = format!("{}\nType: {}", node.label, node.node_type);
    for (key, value) in &node.properties {
        title.push_str(&format!("\n{key}: {value}"));
    }
    title
}
