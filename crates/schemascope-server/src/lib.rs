//! HTTP API for graph fetch, rebuild, cache and status

pub mod router;
pub mod handlers;
pub mod error;


use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use schemascope_core::Source;
use schemascope_engine::GraphService;
use tokio::net::TcpListener;
use tracing::info;

pub use error::{ApiError, status_for};
pub use router::create_router;

/// Shared by every handler.
pub struct ServerState {
    pub service: Arc<GraphService>,
    /// Used when a request names no source.
    pub default_source: Source,
}

impl ServerState {
    pub fn new(service: Arc<GraphService>, default_source: Source) -> Self {
        Self {
            service,
            default_source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct SchemascopeServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl SchemascopeServer {
    pub fn new(state: Arc<ServerState>, config: ServerConfig) -> Self {
        Self { state, config }
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.config.addr();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn start(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves.
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let local: SocketAddr = listener.local_addr()?;
        info!("Schemascope API listening on http://{}", local);
        info!("Sources: {:?}", self.state.service.sources());

        let app = create_router(Arc::clone(&self.state));
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        self.state.service.repository().shutdown();
        info!("Schemascope API stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
