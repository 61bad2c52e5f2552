//! Ingestion sink trait.
//!
//! Ingestion collaborators (document parsers, collectors) push post-parse
//! records through [`IngestBackend`]. It is deliberately separate from the
//! read contract in [`super::Backend`]: read-only deployments need not
//! implement it.

use crate::Result;
use crate::context::QueryContext;
use crate::models::IngestBatch;
use serde::Serialize;

/// Number of records merged per node kind by one ingest call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Artifact records.
    pub artifacts: usize,
    /// Package records.
    pub packages: usize,
    /// Builders.
    pub builders: usize,
    /// Attestation records.
    pub attestations: usize,
    /// Metadata records.
    pub metadata: usize,
    /// Identity records.
    pub identities: usize,
    /// Vulnerabilities.
    pub vulnerabilities: usize,
}

impl IngestSummary {
    /// Counts the records of a batch.
    #[must_use]
    pub fn of(batch: &IngestBatch) -> Self {
        Self {
            artifacts: batch.artifacts.len(),
            packages: batch.packages.len(),
            builders: batch.builders.len(),
            attestations: batch.attestations.len(),
            metadata: batch.metadata.len(),
            identities: batch.identities.len(),
            vulnerabilities: batch.vulnerabilities.len(),
        }
    }

    /// Returns the total record count.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.artifacts
            + self.packages
            + self.builders
            + self.attestations
            + self.metadata
            + self.identities
            + self.vulnerabilities
    }

    /// Adds another summary into this one.
    pub const fn add(&mut self, other: &Self) {
        self.artifacts += other.artifacts;
        self.packages += other.packages;
        self.builders += other.builders;
        self.attestations += other.attestations;
        self.metadata += other.metadata;
        self.identities += other.identities;
        self.vulnerabilities += other.vulnerabilities;
    }

    /// Iterates `(kind, count)` pairs, for metrics labels.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, usize)> {
        [
            ("artifact", self.artifacts),
            ("package", self.packages),
            ("builder", self.builders),
            ("attestation", self.attestations),
            ("metadata", self.metadata),
            ("identity", self.identities),
            ("vulnerability", self.vulnerabilities),
        ]
        .into_iter()
    }
}

/// Write side of a backend: idempotent upsert by identity.
///
/// # Implementor Notes
///
/// - Apply a batch atomically: reject it whole if any reference is dangling
/// - Merge records with an existing identity (see [`crate::models::record`])
/// - Ingesting the same batch twice must leave the graph unchanged
pub trait IngestBackend: Send + Sync {
    /// Upserts a batch of records.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the batch references a node
    /// that exists neither in the batch nor in the backend,
    /// [`crate::Error::BackendUnavailable`] if storage is unreachable, or
    /// [`crate::Error::Cancelled`] if the context stops the call.
    fn ingest(&self, ctx: &QueryContext, batch: &IngestBatch) -> Result<IngestSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactRecord, Vulnerability};

    #[test]
    fn test_summary_counts_batch() {
        let batch = IngestBatch::new()
            .with_artifact(ArtifactRecord::new("sha256:abc").unwrap())
            .with_vulnerability(Vulnerability::new("CVE-2024-1").unwrap());
        let mut summary = IngestSummary::of(&batch);
        assert_eq!(summary.total(), 2);

        summary.add(&IngestSummary::of(&batch));
        assert_eq!(summary.artifacts, 2);
        assert_eq!(summary.iter().map(|(_, n)| n).sum::<usize>(), 4);
    }
}
