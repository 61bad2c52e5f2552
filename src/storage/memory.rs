//! In-memory provenance graph backend.
//!
//! Provides a fast, non-persistent implementation of [`Backend`] and
//! [`IngestBackend`] for tests and development.

use crate::context::QueryContext;
use crate::models::{
    Artifact, Attestation, Builder, Identity, IngestBatch, Metadata, Package, Vulnerability,
};
use crate::observability::metrics::record_ingest;
use crate::storage::resolve::Resolver;
use crate::storage::snapshot::GraphSnapshot;
use crate::storage::traits::{Backend, BackendArgs, IngestBackend, IngestSummary};
use crate::{Error, Result};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::instrument;

const BACKEND: &str = "memory";

/// Arguments for an [`InMemoryBackend`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryArgs {
    /// Records loaded at construction.
    pub seed: IngestBatch,
}

impl BackendArgs for InMemoryArgs {}

/// In-memory graph backend.
///
/// Readers clone an `Arc<GraphSnapshot>` under a short read lock and resolve
/// against it without holding the lock. Ingestion copies the snapshot on
/// write only while readers still hold the old one, then swaps it in.
///
/// # Example
///
/// ```rust
/// use provgraph::models::{ArtifactRecord, IngestBatch};
/// use provgraph::{Backend, InMemoryBackend, IngestBackend, QueryContext};
///
/// let backend = InMemoryBackend::new();
/// let ctx = QueryContext::new();
/// backend.ingest(&ctx, &IngestBatch::new().with_artifact(ArtifactRecord::new("sha256:abc")?))?;
/// assert_eq!(backend.artifacts(&ctx)?.len(), 1);
/// # Ok::<(), provgraph::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    snapshot: RwLock<Arc<GraphSnapshot>>,
    unavailable: RwLock<Option<String>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-loaded with `args.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the seed batch has dangling
    /// references.
    pub fn with_args(args: &InMemoryArgs) -> Result<Self> {
        let mut snapshot = GraphSnapshot::new();
        snapshot.apply(&args.seed)?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            unavailable: RwLock::new(None),
        })
    }

    /// Returns the number of stored nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.current().node_count()
    }

    /// Simulates unreachable storage: while set, every call fails with
    /// [`Error::BackendUnavailable`] carrying `reason`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self
            .unavailable
            .write()
            .unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    fn current(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns the current snapshot after availability and context checks.
    fn load(&self, ctx: &QueryContext, operation: &str) -> Result<Arc<GraphSnapshot>> {
        ctx.check(operation)?;
        self.ensure_available()?;
        Ok(self.current())
    }

    fn ensure_available(&self) -> Result<()> {
        let unavailable = self
            .unavailable
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match unavailable.as_deref() {
            Some(reason) => Err(Error::BackendUnavailable {
                backend: BACKEND.to_string(),
                cause: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn artifacts(&self, ctx: &QueryContext) -> Result<Vec<Artifact>> {
        let snapshot = self.load(ctx, "artifacts")?;
        Resolver::new(&snapshot, ctx, "artifacts").all_artifacts()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn packages(&self, ctx: &QueryContext) -> Result<Vec<Package>> {
        let snapshot = self.load(ctx, "packages")?;
        Resolver::new(&snapshot, ctx, "packages").all_packages()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn builders(&self, ctx: &QueryContext) -> Result<Vec<Builder>> {
        let snapshot = self.load(ctx, "builders")?;
        Resolver::new(&snapshot, ctx, "builders").all_builders()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn attestations(&self, ctx: &QueryContext) -> Result<Vec<Attestation>> {
        let snapshot = self.load(ctx, "attestations")?;
        Resolver::new(&snapshot, ctx, "attestations").all_attestations()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn metadata(&self, ctx: &QueryContext) -> Result<Vec<Metadata>> {
        let snapshot = self.load(ctx, "metadata")?;
        Resolver::new(&snapshot, ctx, "metadata").all_metadata()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn identities(&self, ctx: &QueryContext) -> Result<Vec<Identity>> {
        let snapshot = self.load(ctx, "identities")?;
        Resolver::new(&snapshot, ctx, "identities").all_identities()
    }

    #[instrument(skip_all, fields(request_id = %ctx.request_id()))]
    fn vulnerabilities(&self, ctx: &QueryContext) -> Result<Vec<Vulnerability>> {
        let snapshot = self.load(ctx, "vulnerabilities")?;
        Resolver::new(&snapshot, ctx, "vulnerabilities").all_vulnerabilities()
    }
}

impl IngestBackend for InMemoryBackend {
    #[instrument(skip_all, fields(request_id = %ctx.request_id(), records = batch.len()))]
    fn ingest(&self, ctx: &QueryContext, batch: &IngestBatch) -> Result<IngestSummary> {
        ctx.check("ingest")?;
        self.ensure_available()?;

        let summary = {
            let mut guard = self
                .snapshot
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            // Validation runs before any mutation, so a rejected batch leaves
            // the (possibly cloned) snapshot unchanged.
            Arc::make_mut(&mut guard).apply(batch)?
        };

        record_ingest(BACKEND, &summary);
        tracing::info!(records = summary.total(), "Ingested batch");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ArtifactRecord, AttestationPayload, AttestationRecord, BuilderKey, IdentityRecord,
        MetadataPayload, MetadataRecord, NodeRef, PackageRecord, ScorecardPayload, VexPayload,
    };

    fn populated() -> InMemoryBackend {
        let batch = IngestBatch::new()
            .with_builder(Builder::new("https://github.com/actions", "run-1").unwrap())
            .with_artifact(
                ArtifactRecord::new("sha256:app")
                    .unwrap()
                    .built_by(BuilderKey::new("https://github.com/actions", "run-1").unwrap())
                    .depends_on(NodeRef::package("pkg:npm/left-pad@1.3.0").unwrap()),
            )
            .with_package(PackageRecord::new("pkg:npm/left-pad@1.3.0").unwrap())
            .with_vulnerability(Vulnerability::new("CVE-2024-0001").unwrap())
            .with_attestation(
                AttestationRecord::new("sha256:att")
                    .unwrap()
                    .attests(NodeRef::artifact("sha256:app").unwrap())
                    .references(crate::models::NaturalId::new("CVE-2024-0001").unwrap())
                    .with_payload(AttestationPayload::Vex(VexPayload::default())),
            )
            .with_metadata(
                MetadataRecord::new("scorecard", "left-pad")
                    .unwrap()
                    .attached_to(NodeRef::package("pkg:npm/left-pad@1.3.0").unwrap())
                    .with_payload(MetadataPayload::Scorecard(ScorecardPayload::default())),
            )
            .with_identity(
                IdentityRecord::new("sha256:key", "release-bot")
                    .unwrap()
                    .signed(crate::models::Digest::new("sha256:att").unwrap()),
            );
        InMemoryBackend::with_args(&InMemoryArgs { seed: batch }).unwrap()
    }

    #[test]
    fn test_every_operation_is_populated() {
        let backend = populated();
        let ctx = QueryContext::new();

        let artifacts = backend.artifacts(&ctx).unwrap();
        assert_eq!(artifacts[0].built_by[0].id.as_str(), "run-1");
        assert!(artifacts[0].depends_on[0].as_package().is_some());

        assert_eq!(backend.packages(&ctx).unwrap().len(), 1);
        assert_eq!(backend.builders(&ctx).unwrap().len(), 1);
        assert_eq!(backend.vulnerabilities(&ctx).unwrap().len(), 1);

        let attestations = backend.attestations(&ctx).unwrap();
        assert_eq!(attestations[0].vulnerabilities[0].id.as_str(), "CVE-2024-0001");
        assert!(attestations[0].attested_objects[0].as_artifact().is_some());

        let metadata = backend.metadata(&ctx).unwrap();
        assert!(matches!(metadata[0].payload, Some(MetadataPayload::Scorecard(_))));

        let identities = backend.identities(&ctx).unwrap();
        assert_eq!(identities[0].attestations[0].digest.as_str(), "sha256:att");
    }

    #[test]
    fn test_unavailable_backend_never_returns_empty_list() {
        let backend = InMemoryBackend::new();
        let ctx = QueryContext::new();
        backend.set_unavailable(Some("maintenance"));

        let err = backend.artifacts(&ctx).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { ref cause, .. } if cause == "maintenance"));

        backend.set_unavailable(None);
        assert!(backend.artifacts(&ctx).unwrap().is_empty());
    }

    #[test]
    fn test_reader_keeps_its_snapshot_across_ingest() {
        let backend = populated();
        let before = backend.current();
        let ctx = QueryContext::new();

        backend
            .ingest(
                &ctx,
                &IngestBatch::new().with_artifact(ArtifactRecord::new("sha256:new").unwrap()),
            )
            .unwrap();

        assert_eq!(before.artifacts.len(), 1);
        assert_eq!(backend.artifacts(&ctx).unwrap().len(), 2);
    }
}
