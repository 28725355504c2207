//! Unit tests for schemascope-core module

use crate::test_utils::{abc_graph, schema_graph};
use crate::*;

#[test]
fn test_source_and_mode_parsing() {
    assert_eq!("postgres".parse::<Source>().unwrap(), Source::Postgres);
    assert_eq!(" Catalog ".parse::<Source>().unwrap(), Source::Catalog);
    assert_eq!("data".parse::<Mode>().unwrap(), Mode::Data);

    let err = "oracle".parse::<Source>().unwrap_err();
    assert_eq!(err.code(), "invalid_source");
    let err = "rows".parse::<Mode>().unwrap_err();
    assert_eq!(err.code(), "invalid_mode");
}

#[test]
fn test_node_type_from_engine_type() {
    let test_cases = vec![
        ("BASE TABLE", Some(NodeType::Table)),
        ("table", Some(NodeType::Table)),
        ("FOREIGN", Some(NodeType::Table)),
        ("VIEW", Some(NodeType::View)),
        ("synonym", Some(NodeType::Synonym)),
        ("SEQUENCE", None),
    ];

    for (raw, expected) in test_cases {
        assert_eq!(NodeType::from_engine_type(raw), expected, "Failed for {}", raw);
    }
}

#[test]
fn test_wire_shape_of_generic_graph() {
    let graph = GenericGraph::new(
        vec![GenericNode::new("main.users", "users", NodeType::Table).with_property("columnCount", 3i64)],
        vec![],
    );
    let json = serde_json::to_value(&graph).unwrap();
    assert_eq!(json["nodes"][0]["type"], "TABLE");
    assert_eq!(json["nodes"][0]["properties"]["columnCount"], 3);
    assert!(json["edges"].as_array().unwrap().is_empty());

    let edge = GenericEdge::new("a", "b", "fk", EdgeType::ForeignKey);
    assert_eq!(serde_json::to_value(&edge).unwrap()["type"], "FOREIGN_KEY");
}

#[test]
fn test_scalar_from_json() {
    assert_eq!(Scalar::from_json(&serde_json::json!(null)), Scalar::Null);
    assert_eq!(Scalar::from_json(&serde_json::json!(7)), Scalar::Int(7));
    assert_eq!(Scalar::from_json(&serde_json::json!(1.5)), Scalar::Float(1.5));
    assert_eq!(Scalar::from_json(&serde_json::json!("x")), Scalar::Text("x".to_string()));
    assert_eq!(
        Scalar::from_json(&serde_json::json!([1, 2])),
        Scalar::Text("[1,2]".to_string())
    );
    // untagged: numbers and text survive a JSON round trip unchanged
    let props: Vec<Scalar> = serde_json::from_str(r#"[null, true, 3, 2.5, "s"]"#).unwrap();
    assert_eq!(
        props,
        vec![
            Scalar::Null,
            Scalar::Bool(true),
            Scalar::Int(3),
            Scalar::Float(2.5),
            Scalar::Text("s".to_string())
        ]
    );
}

#[test]
fn test_graph_result_wire_shape() {
    let entry = CacheEntry::new(
        CacheKey::new(Source::Catalog, Mode::Schema, Some("sales".to_string())),
        schema_graph(),
        SourceMetadata {
            source_file_count: 4,
            source_location: "/data/catalog".to_string(),
        },
    );
    let result = GraphResult::from_entry(&entry, true);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["cacheUsed"], true);
    assert_eq!(json["metadata"]["sourceFileCount"], 4);
    assert_eq!(json["metadata"]["sourceLocation"], "/data/catalog");
    assert_eq!(json["graph"]["nodes"].as_array().unwrap().len(), 4);
}

#[test]
fn test_validate_iff_unique_ids_and_known_endpoints() {
    assert!(validate_graph(&schema_graph()).is_ok());
    assert!(validate_graph(&GenericGraph::empty()).is_ok());

    let mut duplicated = schema_graph();
    duplicated.nodes.push(duplicated.nodes[0].clone());
    assert!(validate_graph(&duplicated).is_err());

    let mut dangling = schema_graph();
    dangling.nodes.retain(|n| n.id != "sales.products");
    assert!(validate_graph(&dangling).is_err());
}

#[test]
fn test_cache_round_trip_then_clear_is_miss() {
    let repo = GraphCacheRepository::in_memory();
    let key = CacheKey::new(Source::Postgres, Mode::Schema, Some("public".to_string()));
    repo.put(key.clone(), schema_graph(), SourceMetadata::default()).unwrap();
    assert_eq!(repo.get(&key).unwrap().unwrap().graph, schema_graph());

    repo.clear(&CacheFilter::exact(&key)).unwrap();
    assert!(repo.get(&key).unwrap().is_none());
}

#[test]
fn test_orphan_filter_drops_isolated_node() {
    let filtered = abc_graph().without_orphans();
    let ids: Vec<&str> = filtered.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["A", "B"]);
    assert_eq!(filtered.edge_count(), 1);
}

#[test]
fn test_cache_filter_matching() {
    let key = CacheKey::new(Source::Catalog, Mode::Data, Some("main".to_string()));
    assert!(CacheFilter::all().matches(&key));
    assert!(CacheFilter::exact(&key).matches(&key));
    assert!(
        !CacheFilter {
            scope: Some("other".to_string()),
            ..CacheFilter::default()
        }
        .matches(&key)
    );
    assert!(
        !CacheFilter {
            mode: Some(Mode::Schema),
            ..CacheFilter::default()
        }
        .matches(&key)
    );
    assert_eq!(key.file_stem(), "catalog-data-main");
    assert_eq!(
        CacheKey::new(Source::Postgres, Mode::Schema, Some("my schema".to_string())).file_stem(),
        "postgres-schema-my%20schema"
    );
}

#[test]
fn test_file_stems_are_distinct_per_key() {
    let stem = |scope: Option<&str>| {
        CacheKey::new(Source::Postgres, Mode::Schema, scope.map(str::to_string)).file_stem()
    };
    let stems = [
        stem(Some("sales-2024")),
        stem(Some("sales_2024")),
        stem(Some("a.b")),
        stem(Some("a_b")),
        stem(Some("Sales")),
        stem(Some("sales")),
        stem(Some("_default")),
        stem(Some("")),
        stem(None),
    ];
    let unique: std::collections::HashSet<&String> = stems.iter().collect();
    assert_eq!(unique.len(), stems.len());
    assert_eq!(stems[0], "postgres-schema-sales%2D2024");
}

#[test]
fn test_adapter_end_to_end_is_deterministic() {
    let adapter = GraphAdapter::default();
    let first = adapter.adapt(&schema_graph()).unwrap();
    let second = adapter.adapt(&schema_graph()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.nodes.len(), 4);
    assert_eq!(first.edges.len(), 3);
    let contains = first.edges.iter().find(|e| e.label == "selects from").unwrap();
    assert!(contains.dashes);
}
