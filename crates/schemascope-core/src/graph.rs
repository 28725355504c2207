//! Generic graph container and topology helpers backed by petgraph

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::model::{GenericEdge, GenericNode, NodeType};

/// Backend- and renderer-agnostic node/edge lists.
///
/// Fields are public so that graphs received over the wire can be inspected
/// and validated; builders go through [`GenericGraph::new`], which enforces
/// unique node ids and drops edges whose endpoints are missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenericGraph {
    pub nodes: Vec<GenericNode>,
    pub edges: Vec<GenericEdge>,
}

impl GenericGraph {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a graph, keeping the first node for each id and dropping
    /// dangling or duplicate edges.
    pub fn new(nodes: Vec<GenericNode>, edges: Vec<GenericEdge>) -> Self {
        let mut seen = HashSet::with_capacity(nodes.len());
        let mut kept_nodes = Vec::with_capacity(nodes.len());
        for node in nodes {
            if seen.insert(node.id.clone()) {
                kept_nodes.push(node);
            } else {
                tracing::warn!("Dropping duplicate node id {}", node.id);
            }
        }

        let mut seen_edges = HashSet::with_capacity(edges.len());
        let mut kept_edges = Vec::with_capacity(edges.len());
        for edge in edges {
            if !seen.contains(&edge.source) || !seen.contains(&edge.target) {
                tracing::warn!(
                    "Dropping dangling {} edge {} -> {}",
                    edge.edge_type,
                    edge.source,
                    edge.target
                );
                continue;
            }
            if seen_edges.insert(edge.clone()) {
                kept_edges.push(edge);
            }
        }

        GenericGraph {
            nodes: kept_nodes,
            edges: kept_edges,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Get a node by id.
    pub fn node(&self, id: &str) -> Option<&GenericNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Get all nodes of a specific type.
    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &GenericNode> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    /// Get all outgoing edges from a node.
    pub fn edges_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a GenericEdge> {
        self.edges.iter().filter(move |e| e.source == source)
    }

    /// Directed adjacency view over node ids. Parallel edges collapse into
    /// one weighted entry.
    pub fn topology(&self) -> DiGraphMap<&str, usize> {
        let mut map = DiGraphMap::with_capacity(self.nodes.len(), self.edges.len());
        for node in &self.nodes {
            map.add_node(node.id.as_str());
        }
        for edge in &self.edges {
            let (source, target) = (edge.source.as_str(), edge.target.as_str());
            if !map.contains_node(source) || !map.contains_node(target) {
                continue;
            }
            match map.edge_weight_mut(source, target) {
                Some(weight) => *weight += 1,
                None => {
                    map.add_edge(source, target, 1);
                }
            }
        }
        map
    }

    /// Number of incident edges per node id (self-loops count once).
    pub fn degrees(&self) -> HashMap<&str, usize> {
        let topology = self.topology();
        topology
            .nodes()
            .map(|id| {
                let outgoing: usize = topology
                    .neighbors_directed(id, Direction::Outgoing)
                    .filter_map(|target| topology.edge_weight(id, target))
                    .sum();
                let incoming: usize = topology
                    .neighbors_directed(id, Direction::Incoming)
                    .filter(|source| *source != id)
                    .filter_map(|source| topology.edge_weight(source, id))
                    .sum();
                (id, outgoing + incoming)
            })
            .collect()
    }

    /// Ids of nodes with zero incident edges, in node order.
    pub fn orphan_ids(&self) -> Vec<&str> {
        let degrees = self.degrees();
        self.nodes
            .iter()
            .map(|n| n.id.as_str())
            .filter(|id| degrees.get(id).copied().unwrap_or_default() == 0)
            .collect()
    }

    /// Copy of this graph without orphan nodes. May be empty.
    pub fn without_orphans(&self) -> GenericGraph {
        let orphans: BTreeSet<&str> = self.orphan_ids().into_iter().collect();
        if orphans.is_empty() {
            return self.clone();
        }
        tracing::debug!("Filtering {} orphan nodes", orphans.len());
        GenericGraph {
            nodes: self
                .nodes
                .iter()
                .filter(|n| !orphans.contains(n.id.as_str()))
                .cloned()
                .collect(),
            edges: self.edges.clone(),
        }
    }
}
