//! # provgraph
//!
//! A provenance graph for software supply-chain artifacts.
//!
//! provgraph models files, packages, their builders, attestations and
//! vulnerability metadata as one typed graph, and serves it through a single
//! query contract that any storage backend can satisfy.
//!
//! ## Features
//!
//! - Closed tagged unions for polymorphic edges (`ArtifactOrPackage`,
//!   `AttestationPayload`, `MetadataPayload`) with explicit `__typename`
//!   discriminants
//! - Shared provenance metadata as a capability trait, not a base type
//! - Swappable backends behind [`Backend`] (in-memory, `SQLite`)
//! - Idempotent, all-or-nothing ingestion of post-parse entity records
//! - Cooperative cancellation and deadlines on every query
//!
//! ## Example
//!
//! ```rust
//! use provgraph::models::{Artifact, ArtifactRecord, IngestBatch};
//! use provgraph::storage::InMemoryBackend;
//! use provgraph::{Backend, IngestBackend, QueryContext};
//!
//! let backend = InMemoryBackend::new();
//! let ctx = QueryContext::new();
//!
//! let batch = IngestBatch::new().with_artifact(ArtifactRecord::new("sha256:abc")?.with_name("libfoo"));
//! backend.ingest(&ctx, &batch)?;
//!
//! let artifacts = backend.artifacts(&ctx)?;
//! assert_eq!(artifacts, vec![Artifact::new("sha256:abc")?.with_name("libfoo")]);
//! # Ok::<(), provgraph::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod context;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::ProvGraphConfig;
pub use context::{CancellationSignal, DEFAULT_MAX_DEPTH, QueryContext};
pub use models::{
    Artifact, ArtifactOrPackage, Attestation, AttestationPayload, Builder, Digest, Identity,
    Metadata, MetadataPayload, Package, Provenance, Purl, Vulnerability,
};
pub use services::{BackendFactory, Operation, QueryResponse, QueryService};
pub use storage::{
    Backend, BackendArgs, GraphStore, IngestBackend, IngestSummary, InMemoryBackend, SqliteBackend,
};

/// Error type for provgraph operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidIdentity` | Empty identity field, digest not of the form `algorithm:value` |
/// | `UnknownVariant` | A union-typed value carries a discriminant outside its variant set |
/// | `BackendUnavailable` | Storage cannot be opened or reached |
/// | `QueryFailed` | Any other backend failure, unsupported operation, cyclic graph |
/// | `Cancelled` | The query context was cancelled or its deadline elapsed |
/// | `InvalidInput` | Ingestion batch rejected (dangling reference), bad CLI input |
/// | `OperationFailed` | Config file or observability plumbing failed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// A required identity attribute is missing or malformed.
    ///
    /// Raised when:
    /// - A digest, purl or natural key is empty or whitespace-only
    /// - A digest does not split on `:` into exactly two parts that are
    ///   neither empty nor whitespace-only
    #[error("invalid {entity} identity '{value}': {reason}")]
    InvalidIdentity {
        /// The entity or identity kind being constructed.
        entity: &'static str,
        /// The rejected value.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A union-typed value resolved to a shape outside its declared variants.
    ///
    /// Never coerced to a default variant.
    #[error(
        "unknown variant '{found}' for union {union} (expected one of: {})",
        .expected.join(", ")
    )]
    UnknownVariant {
        /// The union type name (e.g. `ArtifactOrPackage`).
        union: &'static str,
        /// The discriminant or shape description that was found.
        found: String,
        /// Wire discriminants the union declares.
        expected: &'static [&'static str],
    },

    /// The backend cannot reach its storage.
    ///
    /// Distinct from an empty result: callers can tell "no data" from
    /// "cannot answer".
    #[error("backend '{backend}' unavailable: {cause}")]
    BackendUnavailable {
        /// The backend name.
        backend: String,
        /// The underlying cause.
        cause: String,
    },

    /// A backend-specific failure not covered by the other variants.
    #[error("query '{operation}' failed: {cause}")]
    QueryFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The query was cancelled or ran past its deadline.
    #[error("operation '{operation}' cancelled: {reason}")]
    Cancelled {
        /// The operation that observed the cancellation.
        operation: String,
        /// Cancellation reason (`cancelled` or `deadline exceeded`).
        reason: String,
    },

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - An ingestion batch references a node that exists neither in the batch
    ///   nor in the backend
    /// - A batch file cannot be parsed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A non-query operation failed.
    ///
    /// Raised when:
    /// - Config files cannot be read or parsed
    /// - Logging or metrics initialization fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns a stable machine-readable code for the error kind.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidIdentity { .. } => "INVALID_IDENTITY",
            Self::UnknownVariant { .. } => "UNKNOWN_VARIANT",
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::QueryFailed { .. } => "QUERY_FAILED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::OperationFailed { .. } => "INTERNAL",
        }
    }
}

/// Result type alias for provgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidIdentity {
            entity: "digest",
            value: "sha256".to_string(),
            reason: "missing ':' separator".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid digest identity 'sha256': missing ':' separator"
        );

        let err = Error::UnknownVariant {
            union: "ArtifactOrPackage",
            found: "Source".to_string(),
            expected: &["Artifact", "Package"],
        };
        assert_eq!(
            err.to_string(),
            "unknown variant 'Source' for union ArtifactOrPackage (expected one of: Artifact, Package)"
        );

        let err = Error::BackendUnavailable {
            backend: "sqlite".to_string(),
            cause: "unable to open database file".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "backend 'sqlite' unavailable: unable to open database file"
        );
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            Error::InvalidIdentity {
                entity: "purl",
                value: String::new(),
                reason: "empty".to_string(),
            },
            Error::UnknownVariant {
                union: "MetadataPayload",
                found: "x".to_string(),
                expected: &["ScorecardPayload"],
            },
            Error::BackendUnavailable {
                backend: "memory".to_string(),
                cause: "offline".to_string(),
            },
            Error::QueryFailed {
                operation: "artifacts".to_string(),
                cause: "boom".to_string(),
            },
            Error::Cancelled {
                operation: "artifacts".to_string(),
                reason: "cancelled".to_string(),
            },
            Error::InvalidInput("bad".to_string()),
            Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: "missing".to_string(),
            },
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(Error::code).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
