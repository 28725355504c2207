//! Schemascope core: generic graph model, cache repository, and render adapter

pub mod model;
pub mod graph;
pub mod error;
pub mod cache;
pub mod style;
pub mod adapter;
pub mod config;

#[cfg(test)]
pub mod tests;

#[cfg(test)]
pub mod test_utils;

pub use model::{
    CacheEntry, CacheFilter, CacheKey, CacheStatus, EdgeType, GenericEdge, GenericNode, GraphRequest,
    GraphResult, Mode, NodeType, Scalar, Source, SourceMetadata,
};
pub use graph::GenericGraph;
pub use error::{CacheError, GraphError};
pub use cache::{CACHE_DIR, DiskStore, GraphCacheRepository, GraphStore, MemoryStore, cache_dir};
pub use style::{
    EdgeStyle, EdgeStyleOverride, NodeStyle, NodeStyleOverride, StyleOverrides, StyleTheme, DEFAULT_STYLE,
};
pub use adapter::{AdapterOptions, GraphAdapter, RenderEdge, RenderGraph, RenderNode, TABLE_PROPERTY, validate_graph};
pub use config::{CacheBackend, Config, ConfigError};
