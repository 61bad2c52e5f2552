//! Configuration management.
//!
//! Configuration comes from a TOML file (explicit path or the platform config
//! directory) and is then overridden by `PROVGRAPH_*` environment variables.
//!
//! ```toml
//! backend = "sqlite"
//!
//! [sqlite]
//! path = "/var/lib/provgraph/graph.db"
//! read_only = false
//! busy_timeout_ms = 5000
//!
//! [query]
//! timeout_ms = 30000
//! max_depth = 256
//!
//! [observability.logging]
//! format = "json"
//! level = "provgraph=info"
//!
//! [observability.metrics]
//! enabled = true
//! port = 9090
//! ```

use crate::context::DEFAULT_MAX_DEPTH;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Non-persistent in-memory backend.
    #[default]
    Memory,
    /// Embedded `SQLite` database.
    Sqlite,
}

impl BackendKind {
    /// Parses a backend name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// Returns the backend name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// `SQLite` backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSettings {
    /// Database file path.
    pub path: PathBuf,
    /// Open the database read-only; ingestion is rejected.
    pub read_only: bool,
    /// `busy_timeout` pragma in milliseconds.
    pub busy_timeout_ms: u64,
}

impl Default for SqliteSettings {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            read_only: false,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Query settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Default per-call deadline in milliseconds; none when unset.
    pub timeout_ms: Option<u64>,
    /// Longest dependency chain a query materializes.
    pub max_depth: Option<usize>,
}

impl QuerySettings {
    /// Returns the default per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Returns the dependency chain bound.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }
}

/// `[observability.logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive.
    pub level: Option<String>,
    /// Log file path.
    pub file: Option<PathBuf>,
}

/// `[observability.metrics]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Whether the Prometheus listener is started.
    pub enabled: Option<bool>,
    /// Listener port.
    pub port: Option<u16>,
}

/// `[observability]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: LoggingSettings,
    /// Metrics settings.
    pub metrics: MetricsSettings,
}

/// Main configuration for provgraph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvGraphConfig {
    /// Which backend serves queries.
    pub backend: BackendKind,
    /// `SQLite` settings, used when `backend = "sqlite"`.
    pub sqlite: SqliteSettings,
    /// Query settings.
    pub query: QuerySettings,
    /// Logging and metrics settings.
    pub observability: ObservabilitySettings,
}

impl ProvGraphConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration and applies environment overrides.
    ///
    /// An explicit `path` must exist and parse. Without one, the default
    /// locations are tried and defaults are used if none is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the explicit file cannot be read
    /// or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::parse(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the text is not valid config.
    pub fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/provgraph/` on macOS)
    /// 2. XDG config dir (`~/.config/provgraph/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("provgraph").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("provgraph")
                .join("config.toml"),
        ];
        for candidate in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(candidate) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Ignoring config file"),
            }
        }

        Self::default()
    }

    /// Applies `PROVGRAPH_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(value) = env("PROVGRAPH_BACKEND") {
            match BackendKind::parse(&value) {
                Some(kind) => self.backend = kind,
                None => tracing::warn!(value = %value, "Ignoring unknown PROVGRAPH_BACKEND"),
            }
        }
        if let Some(path) = env("PROVGRAPH_SQLITE_PATH").filter(|p| !p.trim().is_empty()) {
            self.sqlite.path = PathBuf::from(path);
        }
        if let Some(value) = env("PROVGRAPH_QUERY_TIMEOUT_MS") {
            match value.trim().parse::<u64>() {
                Ok(0) => self.query.timeout_ms = None,
                Ok(ms) => self.query.timeout_ms = Some(ms),
                Err(_) => tracing::warn!(value = %value, "Ignoring invalid PROVGRAPH_QUERY_TIMEOUT_MS"),
            }
        }
        if let Some(value) = env("PROVGRAPH_QUERY_MAX_DEPTH") {
            match value.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => self.query.max_depth = Some(depth),
                _ => tracing::warn!(value = %value, "Ignoring invalid PROVGRAPH_QUERY_MAX_DEPTH"),
            }
        }
    }

    /// Sets the backend.
    #[must_use]
    pub const fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the `SQLite` database path.
    #[must_use]
    pub fn with_sqlite_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sqlite.path = path.into();
        self
    }
}

fn default_sqlite_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("provgraph.db"),
        |dirs| dirs.data_dir().join("provgraph").join("graph.db"),
    )
}
