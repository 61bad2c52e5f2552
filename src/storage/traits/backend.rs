//! Backend query contract.
//!
//! The query layer programs only against [`Backend`]. A backend resolves each
//! operation against its own storage and returns fully-populated model values:
//! every edge is resolved and every union carries its concrete variant. There
//! is no lazy-load step.
//!
//! # Error Modes and Guarantees
//!
//! | Condition | Error |
//! |-----------|-------|
//! | Storage unreachable | [`Error::BackendUnavailable`] (never an empty list) |
//! | Context cancelled / deadline passed | [`Error::Cancelled`] |
//! | Stored union value outside its variant set | [`Error::UnknownVariant`] |
//! | Dependency cycle, dangling edge, other storage errors | [`Error::QueryFailed`] |
//!
//! Operations never retry; retry policy belongs to the transport layer.
//!
//! # Extending the Contract
//!
//! New operations are added as provided methods whose default body returns
//! [`Error::QueryFailed`], so existing implementations keep compiling and
//! answer "not supported" until they opt in. Existing signatures never change.

use crate::context::QueryContext;
use crate::models::{Artifact, Attestation, Builder, Identity, Metadata, Package, Vulnerability};
use crate::{Error, Result};
use std::fmt;

/// Opaque initialization arguments of a concrete backend.
///
/// Each backend defines its own configuration type (paths, credentials,
/// connection parameters). This marker only names the boundary; the shared
/// contract never inspects it.
pub trait BackendArgs: fmt::Debug + Send + Sync {}

/// Read contract every storage backend satisfies.
///
/// # Implementor Notes
///
/// - Methods use `&self` so a backend can be shared as `Arc<dyn Backend>` and
///   called concurrently without caller-side locking
/// - Each call must observe one consistent snapshot of the graph
/// - Call [`QueryContext::check`] between storage steps and abort promptly
/// - Wrap storage errors into [`Error`] variants; never swallow them
pub trait Backend: Send + Sync {
    /// Short backend name used in logs, metrics and errors.
    fn name(&self) -> &'static str;

    /// Returns every artifact, fully populated.
    ///
    /// # Errors
    ///
    /// See the module-level error table.
    fn artifacts(&self, ctx: &QueryContext) -> Result<Vec<Artifact>>;

    /// Returns every package, fully populated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] unless the backend implements it.
    fn packages(&self, ctx: &QueryContext) -> Result<Vec<Package>> {
        let _ = ctx;
        Err(unsupported(self.name(), "packages"))
    }

    /// Returns every builder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] unless the backend implements it.
    fn builders(&self, ctx: &QueryContext) -> Result<Vec<Builder>> {
        let _ = ctx;
        Err(unsupported(self.name(), "builders"))
    }

    /// Returns every attestation, fully populated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] unless the backend implements it.
    fn attestations(&self, ctx: &QueryContext) -> Result<Vec<Attestation>> {
        let _ = ctx;
        Err(unsupported(self.name(), "attestations"))
    }

    /// Returns every metadata node, fully populated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] unless the backend implements it.
    fn metadata(&self, ctx: &QueryContext) -> Result<Vec<Metadata>> {
        let _ = ctx;
        Err(unsupported(self.name(), "metadata"))
    }

    /// Returns every signing identity, fully populated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] unless the backend implements it.
    fn identities(&self, ctx: &QueryContext) -> Result<Vec<Identity>> {
        let _ = ctx;
        Err(unsupported(self.name(), "identities"))
    }

    /// Returns every vulnerability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueryFailed`] unless the backend implements it.
    fn vulnerabilities(&self, ctx: &QueryContext) -> Result<Vec<Vulnerability>> {
        let _ = ctx;
        Err(unsupported(self.name(), "vulnerabilities"))
    }
}

fn unsupported(backend: &str, operation: &str) -> Error {
    Error::QueryFailed {
        operation: operation.to_string(),
        cause: format!("operation not supported by backend '{backend}'"),
    }
}
