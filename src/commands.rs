//! CLI command implementations

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use schemascope_core::{CacheFilter, Config, GraphAdapter, GraphRequest, Mode, Source};
use schemascope_engine::GraphService;
use schemascope_presenter::{GraphBackend, GraphPresenter, HttpBackend, LocalBackend};
use schemascope_server::{SchemascopeServer, ServerConfig, ServerState};

use crate::Target;

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    Config::load(path).context("Failed to load configuration")
}

fn default_source(config: &Config) -> anyhow::Result<Source> {
    config
        .default_source()
        .context("No source configured: set [postgres] url / DATABASE_URL or [catalog] dir")
}

/// In-process backend from the config, or an HTTP backend for `server`.
fn backend(config_path: Option<&Path>, server: Option<String>) -> anyhow::Result<(Arc<dyn GraphBackend>, Config)> {
    match server {
        Some(url) => {
            let config = Config::read(config_path).context("Failed to load configuration")?;
            tracing::debug!("Using server at {}", url);
            Ok((Arc::new(HttpBackend::new(url)), config))
        }
        None => {
            let config = load_config(config_path)?;
            let service = GraphService::from_config(&config)?;
            Ok((Arc::new(LocalBackend::new(Arc::new(service))), config))
        }
    }
}

/// `--source` wins over the configured default source.
fn graph_request(config: &Config, target: Target) -> anyhow::Result<GraphRequest> {
    let source = match target.source {
        Some(source) => source,
        None => default_source(config)?,
    };
    let request = GraphRequest::new(source, target.mode);
    Ok(match target.scope {
        Some(scope) => request.with_scope(scope),
        None => request,
    })
}

pub async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let service = Arc::new(GraphService::from_config(&config)?);
    let state = Arc::new(ServerState::new(service, default_source(&config)?));
    let server_config = ServerConfig {
        host: host.unwrap_or_else(|| config.server.host.clone()),
        port: port.unwrap_or(config.server.port),
    };

    tracing::info!("Starting Schemascope server on {}", server_config.addr());
    SchemascopeServer::new(state, server_config).start().await
}

pub async fn build(
    config_path: Option<&Path>,
    target: Target,
    rebuild: bool,
    server: Option<String>,
) -> anyhow::Result<()> {
    let (backend, config) = backend(config_path, server)?;
    let request = graph_request(&config, target)?;

    let result = if rebuild {
        backend.rebuild(&request).await?
    } else {
        backend.get_graph(&request, true).await?
    };

    println!(
        "{} {} graph: {} nodes, {} edges ({})",
        request.source,
        request.mode,
        result.graph.node_count(),
        result.graph.edge_count(),
        if result.cache_used { "cached" } else { "built" }
    );
    println!(
        "Source: {} ({} entities)",
        result.metadata.source_location, result.metadata.source_file_count
    );
    Ok(())
}

pub async fn export(
    config_path: Option<&Path>,
    target: Target,
    server: Option<String>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (backend, config) = backend(config_path, server)?;
    let request = graph_request(&config, target)?;
    let adapter = GraphAdapter::new(config.theme(), config.adapter);

    let presenter = GraphPresenter::new(backend, adapter, request);
    presenter.subscribe(|state| {
        tracing::debug!("Presenter is {:?}", state.phase);
    });
    let state = presenter.load_graph(true).await?;

    let graph = state.graph.clone().unwrap_or_default();
    let json = serde_json::to_string_pretty(&graph)?;
    match out {
        Some(path) => {
            std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(
                "Wrote {} nodes and {} edges to {}",
                graph.nodes.len(),
                graph.edges.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn status(config_path: Option<&Path>, target: Target, server: Option<String>) -> anyhow::Result<()> {
    let (backend, config) = backend(config_path, server)?;
    let request = graph_request(&config, target)?;
    let status = backend.status(&request).await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

pub async fn clear(
    config_path: Option<&Path>,
    source: Option<Source>,
    mode: Option<Mode>,
    scope: Option<String>,
    server: Option<String>,
) -> anyhow::Result<()> {
    let remote = server.is_some();
    let (backend, config) = backend(config_path, server)?;
    if !remote && config.cache.backend == schemascope_core::CacheBackend::Memory {
        tracing::warn!("The memory cache lives inside the server process; use --server to clear it");
    }

    let filter = CacheFilter { source, mode, scope };
    let removed = backend.clear_cache(&filter).await?;
    println!("Cleared {} cache entries", removed);
    Ok(())
}
