//! Test utilities for schemascope-core

use crate::graph::GenericGraph;
use crate::model::{EdgeType, GenericEdge, GenericNode, NodeType};

/// Three tables, one view, two foreign keys and a view dependency.
pub fn schema_graph() -> GenericGraph {
    GenericGraph::new(
        vec![
            GenericNode::new("sales.customers", "customers", NodeType::Table),
            GenericNode::new("sales.order_totals", "order_totals", NodeType::View),
            GenericNode::new("sales.orders", "orders", NodeType::Table),
            GenericNode::new("sales.products", "products", NodeType::Table),
        ],
        vec![
            GenericEdge::new("sales.orders", "sales.customers", "customer_id", EdgeType::ForeignKey),
            GenericEdge::new("sales.orders", "sales.products", "product_id", EdgeType::ForeignKey),
            GenericEdge::new("sales.order_totals", "sales.orders", "selects from", EdgeType::Contains),
        ],
    )
}

/// Graph with nodes A, B, C and the single edge A -> B.
pub fn abc_graph() -> GenericGraph {
    GenericGraph::new(
        vec![
            GenericNode::new("A", "A", NodeType::Record),
            GenericNode::new("B", "B", NodeType::Record),
            GenericNode::new("C", "C", NodeType::Record),
        ],
        vec![GenericEdge::new("A", "B", "ref", EdgeType::Association)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_well_formed() {
        assert!(crate::validate_graph(&schema_graph()).is_ok());
        assert!(crate::validate_graph(&abc_graph()).is_ok());
        assert_eq!(schema_graph().edge_count(), 3);
    }
}
