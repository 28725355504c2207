//! Backing-store engines, graph builders, and the graph service

pub mod engine;
pub mod postgres;
pub mod catalog;
pub mod memory;
pub mod schema;
pub mod data;
pub mod service;

#[cfg(test)]
pub mod tests;

use std::sync::Arc;

use schemascope_core::{Config, GraphError};

pub use engine::{Entity, ForeignKey, QueryEngine, Row};
pub use postgres::PostgresEngine;
pub use catalog::CatalogEngine;
pub use memory::MemoryEngine;
pub use schema::{SchemaGraphBuilder, build_schema_graph};
pub use data::{DataGraphBuilder, DataGraphOptions, RecordIndex, TableSample, build_data_graph};
pub use service::{GraphService, HealthReport, HealthStatus};

/// Create an engine for every source configured in `config`.
pub fn create_engines(config: &Config) -> Result<Vec<Arc<dyn QueryEngine>>, GraphError> {
    let mut engines: Vec<Arc<dyn QueryEngine>> = Vec::new();
    if let Some(section) = &config.postgres {
        engines.push(Arc::new(PostgresEngine::connect_lazy(section)?));
    }
    if let Some(section) = &config.catalog {
        engines.push(Arc::new(CatalogEngine::from_config(section)));
    }
    Ok(engines)
}
