//! Backend factory for storage layer initialization.
//!
//! Centralizes backend creation so the CLI, tests and embedders select a
//! backend from configuration the same way.
//!
//! # Architecture
//!
//! ```text
//! BackendFactory
//!   ├── memory()          → Arc<dyn GraphStore>
//!   ├── sqlite(&args)     → Arc<dyn GraphStore>
//!   └── from_config(&cfg) → Arc<dyn GraphStore>
//! ```

use crate::Result;
use crate::config::{BackendKind, ProvGraphConfig};
use crate::storage::{GraphStore, InMemoryBackend, SqliteArgs, SqliteBackend};
use std::sync::Arc;

/// Factory for creating storage backends.
///
/// # Example
///
/// ```rust
/// use provgraph::config::ProvGraphConfig;
/// use provgraph::Backend;
/// use provgraph::services::BackendFactory;
///
/// let store = BackendFactory::from_config(&ProvGraphConfig::new())?;
/// assert_eq!(store.name(), "memory");
/// # Ok::<(), provgraph::Error>(())
/// ```
pub struct BackendFactory;

impl BackendFactory {
    /// Creates the backend selected by `config.backend`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BackendUnavailable`] if the selected storage
    /// cannot be opened.
    pub fn from_config(config: &ProvGraphConfig) -> Result<Arc<dyn GraphStore>> {
        match config.backend {
            BackendKind::Memory => Ok(Self::memory()),
            BackendKind::Sqlite => Self::sqlite(&SqliteArgs::from(&config.sqlite)),
        }
    }

    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn memory() -> Arc<dyn GraphStore> {
        tracing::debug!("Using in-memory backend");
        Arc::new(InMemoryBackend::new())
    }

    /// Opens a `SQLite` backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn sqlite(args: &SqliteArgs) -> Result<Arc<dyn GraphStore>> {
        match SqliteBackend::open(args) {
            Ok(backend) => Ok(Arc::new(backend)),
            Err(e) => {
                tracing::warn!(path = %args.path.display(), error = %e, "Failed to open SQLite backend");
                Err(e)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::storage::Backend;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_uses_memory() {
        let store = BackendFactory::from_config(&ProvGraphConfig::new()).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_sqlite_config_creates_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("graph.db");
        let config = ProvGraphConfig::new()
            .with_backend(BackendKind::Sqlite)
            .with_sqlite_path(&path);

        let store = BackendFactory::from_config(&config).unwrap();
        assert_eq!(store.name(), "sqlite");
        assert!(path.exists());
    }

    #[test]
    fn test_missing_read_only_database_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let args = SqliteArgs::new(dir.path().join("absent.db")).read_only(true);

        let err = BackendFactory::sqlite(&args).err().unwrap();
        assert!(matches!(err, Error::BackendUnavailable { .. }));
    }
}
