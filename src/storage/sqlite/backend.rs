//! `SQLite` provenance graph backend.

use super::connection::{acquire_lock, classify_sqlite_error, configure_connection};
use super::schema::SCHEMA;
use super::store::{Table, load_batch_records, load_snapshot, reference_exists, write_merged};
use crate::config::SqliteSettings;
use crate::context::QueryContext;
use crate::models::{
    Artifact, Attestation, Builder, Identity, IngestBatch, Metadata, Package, Vulnerability,
};
use crate::observability::metrics::record_ingest;
use crate::storage::resolve::Resolver;
use crate::storage::snapshot::{GraphSnapshot, check_references};
use crate::storage::traits::{Backend, BackendArgs, IngestBackend, IngestSummary};
use crate::{Error, Result};
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

const BACKEND: &str = "sqlite";

/// Arguments for opening a [`SqliteBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteArgs {
    /// Database file path.
    pub path: PathBuf,
    /// Open without write access; the file must exist.
    pub read_only: bool,
    /// `busy_timeout` pragma in milliseconds.
    pub busy_timeout_ms: u64,
}

impl SqliteArgs {
    /// Read-write arguments for `path` with the default busy timeout.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            busy_timeout_ms: SqliteSettings::default().busy_timeout_ms,
        }
    }

    /// Sets read-only mode.
    #[must_use]
    pub const fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

impl From<&SqliteSettings> for SqliteArgs {
    fn from(settings: &SqliteSettings) -> Self {
        Self {
            path: settings.path.clone(),
            read_only: settings.read_only,
            busy_timeout_ms: settings.busy_timeout_ms,
        }
    }
}

impl BackendArgs for SqliteArgs {}

/// `SQLite`-based provenance graph backend.
///
/// # Concurrency Model
///
/// Uses a `Mutex<Connection>` for thread-safe access. Each read loads the
/// tables it needs inside one transaction, so a call never observes a
/// half-applied ingest. Resolution runs after the lock is released.
///
/// # Schema
///
/// One table per node type plus an `edges` table; sets and payloads are
/// stored as JSON text.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    read_only: bool,
}

impl SqliteBackend {
    /// Opens (and for read-write mode, creates) a database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the database cannot be opened,
    /// or [`Error::QueryFailed`] if the schema cannot be created.
    pub fn open(args: &SqliteArgs) -> Result<Self> {
        let opened = if args.read_only {
            Connection::open_with_flags(
                &args.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        } else {
            create_parent_dir(&args.path)?;
            Connection::open(&args.path)
        };
        let conn = opened.map_err(|e| classify_sqlite_error("open", &e))?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path: Some(args.path.clone()),
            read_only: args.read_only,
        };
        backend.initialize(args.busy_timeout_ms)?;
        tracing::debug!(
            path = %args.path.display(),
            read_only = args.read_only,
            "Opened SQLite backend"
        );
        Ok(backend)
    }

    /// Opens a read-write database at `path`.
    ///
    /// # Errors
    ///
    /// See [`SqliteBackend::open`].
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(&SqliteArgs::new(path))
    }

    /// Creates an in-memory `SQLite` backend (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| classify_sqlite_error("open", &e))?;
        let backend = Self {
            conn: Mutex::new(conn),
            db_path: None,
            read_only: false,
        };
        backend.initialize(SqliteSettings::default().busy_timeout_ms)?;
        Ok(backend)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn initialize(&self, busy_timeout_ms: u64) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn, busy_timeout_ms, self.read_only);
        if !self.read_only {
            conn.execute_batch(SCHEMA)
                .map_err(|e| classify_sqlite_error("create_schema", &e))?;
        }
        Ok(())
    }

    /// Loads `tables` in one read transaction.
    fn snapshot(
        &self,
        ctx: &QueryContext,
        operation: &'static str,
        tables: &[Table],
    ) -> Result<GraphSnapshot> {
        ctx.check(operation)?;
        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|e| classify_sqlite_error(operation, &e))?;
        let snapshot = load_snapshot(&tx, ctx, operation, tables)?;
        tx.commit()
            .map_err(|e| classify_sqlite_error(operation, &e))?;
        Ok(snapshot)
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn artifacts(&self, ctx: &QueryContext) -> Result<Vec<Artifact>> {
        let snapshot = self.snapshot(ctx, "artifacts", Table::NODES)?;
        Resolver::new(&snapshot, ctx, "artifacts").all_artifacts()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn packages(&self, ctx: &QueryContext) -> Result<Vec<Package>> {
        let snapshot = self.snapshot(ctx, "packages", Table::NODES)?;
        Resolver::new(&snapshot, ctx, "packages").all_packages()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn builders(&self, ctx: &QueryContext) -> Result<Vec<Builder>> {
        let snapshot = self.snapshot(ctx, "builders", &[Table::Builders])?;
        Resolver::new(&snapshot, ctx, "builders").all_builders()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn attestations(&self, ctx: &QueryContext) -> Result<Vec<Attestation>> {
        let tables = [
            Table::Builders,
            Table::Vulnerabilities,
            Table::Artifacts,
            Table::Packages,
            Table::Attestations,
        ];
        let snapshot = self.snapshot(ctx, "attestations", &tables)?;
        Resolver::new(&snapshot, ctx, "attestations").all_attestations()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn metadata(&self, ctx: &QueryContext) -> Result<Vec<Metadata>> {
        let tables = [
            Table::Builders,
            Table::Artifacts,
            Table::Packages,
            Table::Metadata,
        ];
        let snapshot = self.snapshot(ctx, "metadata", &tables)?;
        Resolver::new(&snapshot, ctx, "metadata").all_metadata()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn identities(&self, ctx: &QueryContext) -> Result<Vec<Identity>> {
        let tables = [
            Table::Builders,
            Table::Vulnerabilities,
            Table::Artifacts,
            Table::Packages,
            Table::Attestations,
            Table::Identities,
        ];
        let snapshot = self.snapshot(ctx, "identities", &tables)?;
        Resolver::new(&snapshot, ctx, "identities").all_identities()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn vulnerabilities(&self, ctx: &QueryContext) -> Result<Vec<Vulnerability>> {
        let snapshot = self.snapshot(ctx, "vulnerabilities", &[Table::Vulnerabilities])?;
        Resolver::new(&snapshot, ctx, "vulnerabilities").all_vulnerabilities()
    }
}

impl IngestBackend for SqliteBackend {
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), records = batch.len()))]
    fn ingest(&self, ctx: &QueryContext, batch: &IngestBatch) -> Result<IngestSummary> {
        ctx.check("ingest")?;
        if self.read_only {
            return Err(Error::QueryFailed {
                operation: "ingest".to_string(),
                cause: "database is opened read-only".to_string(),
            });
        }

        batch.check_values()?;

        let summary = {
            let mut conn = acquire_lock(&self.conn);
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|e| classify_sqlite_error("ingest", &e))?;
            check_references(batch, |reference| {
                ctx.check("ingest")?;
                reference_exists(&tx, reference)
            })?;
            let mut merged = load_batch_records(&tx, ctx, batch)?;
            merged.merge(batch);
            ctx.check("ingest")?;
            write_merged(&tx, &merged, batch)?;
            tx.commit()
                .map_err(|e| classify_sqlite_error("ingest", &e))?;
            IngestSummary::of(batch)
        };

        record_ingest(BACKEND, &summary);
        tracing::info!(records = summary.total(), "Ingested batch");
        Ok(summary)
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|e| Error::BackendUnavailable {
                backend: BACKEND.to_string(),
                cause: format!("{}: {e}", parent.display()),
            })
        },
        _ => Ok(()),
    }
}
