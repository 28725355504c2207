//! Configuration: `schemascope.toml`, `.env`, and environment overrides

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::AdapterOptions;
use crate::model::Source;
use crate::style::{StyleOverrides, StyleTheme};

/// Looked up in the working directory when no path is given.
pub const CONFIG_FILE: &str = "schemascope.toml";

pub const DEFAULT_PORT: u16 = 7890;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RECORDS_PER_TABLE: usize = 20;
pub const MAX_RECORDS_PER_TABLE_LIMIT: usize = 1000;
pub const DEFAULT_SAMPLE_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("cannot parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    /// Upper bound on one graph build, backing-store I/O included.
    pub timeout_secs: u64,
    pub max_records_per_table: usize,
    /// Drop data-mode records with no incident edges. Off by default: all
    /// sampled records are shown.
    pub filter_orphans: bool,
    /// Tables sampled at once in data mode.
    pub sample_concurrency: usize,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
            max_records_per_table: DEFAULT_MAX_RECORDS_PER_TABLE,
            filter_orphans: false,
            sample_concurrency: DEFAULT_SAMPLE_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub backend: CacheBackend,
    /// Parent of the `.schemascope/` directory for the disk backend.
    pub root: PathBuf,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            root: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresSection {
    pub url: String,
    #[serde(default = "default_schema")]
    pub default_schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSection {
    pub dir: PathBuf,
    #[serde(default = "default_catalog_scope")]
    pub default_scope: String,
}

fn default_catalog_scope() -> String {
    "main".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_source: Option<Source>,
    pub server: ServerSection,
    pub build: BuildSection,
    pub cache: CacheSection,
    pub postgres: Option<PostgresSection>,
    pub catalog: Option<CatalogSection>,
    pub adapter: AdapterOptions,
    /// Field-level overrides merged into the built-in theme.
    pub styles: StyleOverrides,
}

impl Config {
    /// Load `.env`, then the config file (explicit path, or `schemascope.toml`
    /// if present), then environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// [`Config::load`] without validation, for commands that talk to a
    /// remote server and need no local source.
    pub fn read(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(env_file) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {}", env_file.display());
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::from_file(Path::new(CONFIG_FILE))?,
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::debug!("Reading config from {}", path.display());
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// `DATABASE_URL`, `SCHEMASCOPE_CATALOG_DIR` and `SCHEMASCOPE_PORT`
    /// override the file.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.postgres
                .get_or_insert_with(|| PostgresSection {
                    url: String::new(),
                    default_schema: default_schema(),
                    max_connections: default_max_connections(),
                    connect_timeout_secs: default_connect_timeout(),
                })
                .url = url;
        }
        if let Some(dir) = lookup("SCHEMASCOPE_CATALOG_DIR") {
            self.catalog
                .get_or_insert_with(|| CatalogSection {
                    dir: PathBuf::new(),
                    default_scope: default_catalog_scope(),
                })
                .dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup("SCHEMASCOPE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("SCHEMASCOPE_PORT '{port}' is not a port")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.timeout_secs == 0 {
            return Err(ConfigError::Invalid("build.timeout_secs must be > 0".to_string()));
        }
        if !(1..=MAX_RECORDS_PER_TABLE_LIMIT).contains(&self.build.max_records_per_table) {
            return Err(ConfigError::Invalid(format!(
                "build.max_records_per_table must be within 1..={MAX_RECORDS_PER_TABLE_LIMIT}"
            )));
        }
        if self.build.sample_concurrency == 0 {
            return Err(ConfigError::Invalid("build.sample_concurrency must be > 0".to_string()));
        }
        if self.configured_sources().is_empty() {
            return Err(ConfigError::Invalid(
                "no source configured: set [postgres] url / DATABASE_URL or [catalog] dir".to_string(),
            ));
        }
        if let Some(source) = self.default_source {
            if !self.configured_sources().contains(&source) {
                return Err(ConfigError::Invalid(format!(
                    "default_source '{source}' is not configured"
                )));
            }
        }
        Ok(())
    }

    pub fn configured_sources(&self) -> Vec<Source> {
        let mut sources = Vec::new();
        if self.postgres.is_some() {
            sources.push(Source::Postgres);
        }
        if self.catalog.is_some() {
            sources.push(Source::Catalog);
        }
        sources
    }

    /// Explicit default, else the first configured source.
    pub fn default_source(&self) -> Option<Source> {
        self.default_source
            .or_else(|| self.configured_sources().into_iter().next())
    }

    pub fn theme(&self) -> StyleTheme {
        StyleTheme::with_overrides(&self.styles)
    }

    pub fn build_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.build.timeout_secs)
    }
}
