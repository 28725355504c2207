//! Visual styles per node/edge type

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bucket used when a type has no style of its own.
pub const DEFAULT_STYLE: &str = "DEFAULT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStyle {
    pub shape: String,
    pub background: String,
    pub border: String,
    pub size: u32,
    pub font_color: String,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            shape: "dot".to_string(),
            background: "#b0bec5".to_string(),
            border: "#546e7a".to_string(),
            size: 16,
            font_color: "#263238".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeStyle {
    pub color: String,
    pub dashes: bool,
    pub arrows: String,
    pub width: u32,
}

impl Default for EdgeStyle {
    fn default() -> Self {
        Self {
            color: "#90a4ae".to_string(),
            dashes: false,
            arrows: "to".to_string(),
            width: 1,
        }
    }
}

fn node_style(shape: &str, background: &str, border: &str, size: u32) -> NodeStyle {
    NodeStyle {
        shape: shape.to_string(),
        background: background.to_string(),
        border: border.to_string(),
        size,
        ..NodeStyle::default()
    }
}

fn edge_style(color: &str, dashes: bool, width: u32) -> EdgeStyle {
    EdgeStyle {
        color: color.to_string(),
        dashes,
        width,
        ..EdgeStyle::default()
    }
}

/// Style lookup tables keyed by type name (`TABLE`, `FOREIGN_KEY`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleTheme {
    pub nodes: BTreeMap<String, NodeStyle>,
    pub edges: BTreeMap<String, EdgeStyle>,
}

impl Default for StyleTheme {
    fn default() -> Self {
        let nodes = BTreeMap::from([
            ("TABLE".to_string(), node_style("box", "#4f8bc9", "#2c5d8f", 24)),
            ("VIEW".to_string(), node_style("ellipse", "#7cb342", "#4b830d", 22)),
            ("SYNONYM".to_string(), node_style("diamond", "#ffb74d", "#c88719", 18)),
            ("RECORD".to_string(), node_style("dot", "#9575cd", "#65499c", 12)),
            (DEFAULT_STYLE.to_string(), NodeStyle::default()),
        ]);
        let edges = BTreeMap::from([
            ("FOREIGN_KEY".to_string(), edge_style("#2c5d8f", false, 2)),
            ("ASSOCIATION".to_string(), edge_style("#65499c", false, 1)),
            ("CONTAINS".to_string(), edge_style("#4b830d", true, 1)),
            (DEFAULT_STYLE.to_string(), EdgeStyle::default()),
        ]);
        Self { nodes, edges }
    }
}

/// Partial node style from config; unset fields keep the base style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStyleOverride {
    pub shape: Option<String>,
    pub background: Option<String>,
    pub border: Option<String>,
    pub size: Option<u32>,
    pub font_color: Option<String>,
}

impl NodeStyleOverride {
    fn apply(&self, style: &mut NodeStyle) {
        if let Some(shape) = &self.shape {
            style.shape = shape.clone();
        }
        if let Some(background) = &self.background {
            style.background = background.clone();
        }
        if let Some(border) = &self.border {
            style.border = border.clone();
        }
        if let Some(size) = self.size {
            style.size = size;
        }
        if let Some(font_color) = &self.font_color {
            style.font_color = font_color.clone();
        }
    }
}

/// Partial edge style from config; unset fields keep the base style.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeStyleOverride {
    pub color: Option<String>,
    pub dashes: Option<bool>,
    pub arrows: Option<String>,
    pub width: Option<u32>,
}

impl EdgeStyleOverride {
    fn apply(&self, style: &mut EdgeStyle) {
        if let Some(color) = &self.color {
            style.color = color.clone();
        }
        if let Some(dashes) = self.dashes {
            style.dashes = dashes;
        }
        if let Some(arrows) = &self.arrows {
            style.arrows = arrows.clone();
        }
        if let Some(width) = self.width {
            style.width = width;
        }
    }
}

/// The `[styles]` config table, keyed by type name in any case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOverrides {
    pub nodes: BTreeMap<String, NodeStyleOverride>,
    pub edges: BTreeMap<String, EdgeStyleOverride>,
}

impl StyleTheme {
    /// Built-in theme with `overrides` merged in field by field. A type the
    /// theme does not know starts from its `DEFAULT` style.
    pub fn with_overrides(overrides: &StyleOverrides) -> Self {
        let mut theme = StyleTheme::default();
        for (name, patch) in &overrides.nodes {
            let mut style = theme.node_style(&name.to_ascii_uppercase());
            patch.apply(&mut style);
            theme.nodes.insert(name.to_ascii_uppercase(), style);
        }
        for (name, patch) in &overrides.edges {
            let mut style = theme.edge_style(&name.to_ascii_uppercase());
            patch.apply(&mut style);
            theme.edges.insert(name.to_ascii_uppercase(), style);
        }
        theme
    }

    /// Resolve a node style, falling back to `DEFAULT`.
    pub fn node_style(&self, type_name: &str) -> NodeStyle {
        self.nodes
            .get(type_name)
            .or_else(|| self.nodes.get(DEFAULT_STYLE))
            .cloned()
            .unwrap_or_default()
    }

    /// Resolve an edge style, falling back to `DEFAULT`.
    pub fn edge_style(&self, type_name: &str) -> EdgeStyle {
        self.edges
            .get(type_name)
            .or_else(|| self.edges.get(DEFAULT_STYLE))
            .cloned()
            .unwrap_or_default()
    }
}

/// Fixed palette for per-table record colouring.
pub const TABLE_PALETTE: [&str; 10] = [
    "#e57373", "#64b5f6", "#81c784", "#ffd54f", "#ba68c8",
    "#4dd0e1", "#ff8a65", "#a1887f", "#90a4ae", "#f06292",
];

/// Palette colour for a table name. FNV-1a, so stable across runs and builds.
pub fn table_color(table: &str) -> &'static str {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in table.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    TABLE_PALETTE[(hash % TABLE_PALETTE.len() as u64) as usize]
}
