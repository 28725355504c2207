//! Error taxonomy shared by engines, cache, service and presenter

use thiserror::Error;

use crate::model::Source;

/// Failures of a graph request. `Clone` so that single-flight waiters can
/// all observe the leader's failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("unknown source '{0}' (expected 'postgres' or 'catalog')")]
    InvalidSource(String),

    #[error("unknown mode '{0}' (expected 'schema' or 'data')")]
    InvalidMode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("schema '{scope}' not found in {store}")]
    SchemaNotFound { store: Source, scope: String },

    #[error("{store} is unreachable: {message}")]
    Connection { store: Source, message: String },

    #[error("source '{0}' is not configured")]
    SourceUnavailable(Source),

    #[error("graph build for {key} timed out after {millis}ms")]
    Timeout { key: String, millis: u64 },

    #[error("invalid graph: {0}")]
    Validation(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Error reported by a remote server, code kept as sent.
    #[error("{code}: {message}")]
    Remote { code: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphError {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &str {
        match self {
            GraphError::InvalidSource(_) => "invalid_source",
            GraphError::InvalidMode(_) => "invalid_mode",
            GraphError::InvalidRequest(_) => "invalid_request",
            GraphError::SchemaNotFound { .. } => "scope_not_found",
            GraphError::Connection { .. } => "connection_failed",
            GraphError::SourceUnavailable(_) => "source_unavailable",
            GraphError::Timeout { .. } => "timeout",
            GraphError::Validation(_) => "validation_failed",
            GraphError::Cache(_) => "cache_unavailable",
            GraphError::Remote { code, .. } => code,
            GraphError::Internal(_) => "internal",
        }
    }

    pub fn connection(store: Source, message: impl Into<String>) -> Self {
        GraphError::Connection {
            store,
            message: message.into(),
        }
    }
}

/// Failures of the cache backend. Never fatal to a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("cache io error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("cache entry {key} is corrupt: {message}")]
    Corrupt { key: String, message: String },

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}
