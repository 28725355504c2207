//! Schemascope CLI entry point

use clap::{Parser, Subcommand};
use schemascope_core::{Mode, Source};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "schemascope")]
#[command(about = "Explore database structure and sampled rows as a graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to ./schemascope.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Which graph to work on.
#[derive(clap::Args, Debug, Clone)]
pub struct Target {
    /// Backing store: postgres or catalog (defaults to the configured source)
    #[arg(short, long)]
    source: Option<Source>,

    /// schema or data
    #[arg(short, long, default_value = "schema")]
    mode: Mode,

    /// Schema / catalog scope (defaults to the source's default scope)
    #[arg(long)]
    scope: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,
    },
    /// Build a graph and print a summary
    Build {
        #[command(flatten)]
        target: Target,

        /// Ignore the cache and rebuild
        #[arg(long)]
        rebuild: bool,

        /// Talk to a running server instead of building in-process
        #[arg(long)]
        server: Option<String>,
    },
    /// Write the styled render graph as JSON
    Export {
        #[command(flatten)]
        target: Target,

        /// Talk to a running server instead of building in-process
        #[arg(long)]
        server: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show cache status for a graph
    Status {
        #[command(flatten)]
        target: Target,

        #[arg(long)]
        server: Option<String>,
    },
    /// Clear cached graphs (all of them when no filter is given)
    Clear {
        #[arg(short, long)]
        source: Option<Source>,

        #[arg(short, long)]
        mode: Option<Mode>,

        #[arg(long)]
        scope: Option<String>,

        #[arg(long)]
        server: Option<String>,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("schemascope={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Schemascope v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve(config, host, port).await,
        Commands::Build {
            target,
            rebuild,
            server,
        } => commands::build(config, target, rebuild, server).await,
        Commands::Export { target, server, out } => commands::export(config, target, server, out).await,
        Commands::Status { target, server } => commands::status(config, target, server).await,
        Commands::Clear {
            source,
            mode,
            scope,
            server,
        } => commands::clear(config, source, mode, scope, server).await,
        Commands::Version => {
            println!("Schemascope v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
