//! HTTP backend against a running `schemascope serve`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use schemascope_core::{CacheFilter, CacheStatus, GraphError, GraphRequest, GraphResult};

use crate::backend::GraphBackend;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ClearResponse {
    removed: usize,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Like [`HttpBackend::new`], with a per-request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GraphError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GraphError::Internal(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T, GraphError> {
        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GraphError::Internal(format!("malformed response from {}: {e}", self.base_url)));
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status.as_u16(), &body))
    }

    fn transport_error(&self, error: reqwest::Error) -> GraphError {
        let code = if error.is_timeout() { "timeout" } else { "connection_failed" };
        GraphError::Remote {
            code: code.to_string(),
            message: format!("cannot reach {}: {error}", self.base_url),
        }
    }
}

/// Query string pairs for a graph request.
fn request_query(request: &GraphRequest) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("source", request.source.to_string()),
        ("mode", request.mode.to_string()),
    ];
    if let Some(scope) = &request.scope {
        query.push(("scope", scope.clone()));
    }
    query
}

fn filter_query(filter: &CacheFilter) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(source) = filter.source {
        query.push(("source", source.to_string()));
    }
    if let Some(mode) = filter.mode {
        query.push(("mode", mode.to_string()));
    }
    if let Some(scope) = &filter.scope {
        query.push(("scope", scope.clone()));
    }
    query
}

/// Server errors keep the server's code and message. A body that is not an
/// error envelope is reported under `http_<status>`.
fn error_from_body(status: u16, body: &str) -> GraphError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(envelope) => GraphError::Remote {
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => GraphError::Remote {
            code: format!("http_{status}"),
            message: body.trim().to_string(),
        },
    }
}

#[async_trait]
impl GraphBackend for HttpBackend {
    async fn get_graph(&self, request: &GraphRequest, use_cache: bool) -> Result<GraphResult, GraphError> {
        let mut query = request_query(request);
        query.push(("useCache", use_cache.to_string()));
        self.send(self.client.get(self.url("/graph")).query(&query)).await
    }

    async fn rebuild(&self, request: &GraphRequest) -> Result<GraphResult, GraphError> {
        let query = request_query(request);
        self.send(self.client.post(self.url("/graph/rebuild")).query(&query)).await
    }

    async fn clear_cache(&self, filter: &CacheFilter) -> Result<usize, GraphError> {
        let query = filter_query(filter);
        let response: ClearResponse = self
            .send(self.client.post(self.url("/cache/clear")).query(&query))
            .await?;
        Ok(response.removed)
    }

    async fn status(&self, request: &GraphRequest) -> Result<CacheStatus, GraphError> {
        let query = request_query(request);
        self.send(self.client.get(self.url("/status")).query(&query)).await
    }
}
