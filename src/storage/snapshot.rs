//! Identity-keyed record store shared by the reference backends.
//!
//! A [`GraphSnapshot`] holds every node as a flat ingestion record, keyed by
//! its identity. Applying a batch validates every reference first and only
//! then merges, so a rejected batch leaves the snapshot untouched.

use crate::models::{
    ArtifactRecord, AttestationRecord, Builder, BuilderKey, Digest, IdentityRecord, IngestBatch,
    MetadataKey, MetadataRecord, NaturalId, NodeRef, PackageRecord, Purl, Vulnerability,
};
use crate::storage::traits::IngestSummary;
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Maximum number of missing references listed in a rejection message.
const MAX_REPORTED_MISSING: usize = 5;

/// Flat, identity-keyed view of the whole graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphSnapshot {
    /// Artifacts by digest.
    pub artifacts: BTreeMap<Digest, ArtifactRecord>,
    /// Packages by purl.
    pub packages: BTreeMap<Purl, PackageRecord>,
    /// Builders by `(type, id)`.
    pub builders: BTreeMap<BuilderKey, Builder>,
    /// Attestations by digest.
    pub attestations: BTreeMap<Digest, AttestationRecord>,
    /// Metadata by `(type, id)`.
    pub metadata: BTreeMap<MetadataKey, MetadataRecord>,
    /// Identities by digest.
    pub identities: BTreeMap<Digest, IdentityRecord>,
    /// Vulnerabilities by id.
    pub vulnerabilities: BTreeMap<NaturalId, Vulnerability>,
}

impl GraphSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.artifacts.len()
            + self.packages.len()
            + self.builders.len()
            + self.attestations.len()
            + self.metadata.len()
            + self.identities.len()
            + self.vulnerabilities.len()
    }

    /// Returns true if an artifact or package with this identity exists.
    #[must_use]
    pub fn contains_node(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Artifact { digest } => self.artifacts.contains_key(digest),
            NodeRef::Package { purl } => self.packages.contains_key(purl),
        }
    }

    /// Returns true if the referenced record exists in the snapshot.
    #[must_use]
    pub fn contains(&self, reference: Reference<'_>) -> bool {
        match reference {
            Reference::Node(node) => self.contains_node(node),
            Reference::Artifact(digest) => self.artifacts.contains_key(digest),
            Reference::Builder(key) => self.builders.contains_key(key),
            Reference::Vulnerability(id) => self.vulnerabilities.contains_key(id),
            Reference::Attestation(digest) => self.attestations.contains_key(digest),
        }
    }

    /// Validates and merges a batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a record value is rejected by
    /// [`IngestBatch::check_values`], or listing missing references if any
    /// record points at a node that exists neither in the snapshot nor in the
    /// batch. Nothing is merged in either case.
    pub fn apply(&mut self, batch: &IngestBatch) -> Result<IngestSummary> {
        batch.check_values()?;
        check_references(batch, |reference| Ok(self.contains(reference)))?;
        self.merge(batch);
        Ok(IngestSummary::of(batch))
    }

    /// Merges a batch without validating it.
    ///
    /// Records already present are merged field by field; new ones are
    /// inserted as given.
    pub fn merge(&mut self, batch: &IngestBatch) {
        for builder in &batch.builders {
            self.builders
                .entry(builder.key())
                .and_modify(|stored| stored.node_info.merge(&builder.node_info))
                .or_insert_with(|| builder.clone());
        }
        for vulnerability in &batch.vulnerabilities {
            self.vulnerabilities
                .entry(vulnerability.id.clone())
                .and_modify(|stored| stored.node_info.merge(&vulnerability.node_info))
                .or_insert_with(|| vulnerability.clone());
        }
        for record in &batch.artifacts {
            self.artifacts
                .entry(record.digest.clone())
                .and_modify(|stored| stored.merge(record))
                .or_insert_with(|| record.clone());
        }
        for record in &batch.packages {
            self.packages
                .entry(record.purl.clone())
                .and_modify(|stored| stored.merge(record))
                .or_insert_with(|| record.clone());
        }
        for record in &batch.attestations {
            self.attestations
                .entry(record.digest.clone())
                .and_modify(|stored| stored.merge(record))
                .or_insert_with(|| record.clone());
        }
        for record in &batch.metadata {
            self.metadata
                .entry(record.key())
                .and_modify(|stored| stored.merge(record))
                .or_insert_with(|| record.clone());
        }
        for record in &batch.identities {
            self.identities
                .entry(record.digest.clone())
                .and_modify(|stored| stored.merge(record))
                .or_insert_with(|| record.clone());
        }
    }
}

/// A reference from a batch record to a record it does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference<'a> {
    /// `dependsOn`, `attestedObjects` or `attachedTo` target.
    Node(&'a NodeRef),
    /// Artifact contained in a package.
    Artifact(&'a Digest),
    /// Builder of an artifact.
    Builder(&'a BuilderKey),
    /// Vulnerability referenced by an attestation.
    Vulnerability(&'a NaturalId),
    /// Attestation signed by an identity.
    Attestation(&'a Digest),
}

impl fmt::Display for Reference<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(node) => write!(f, "{node}"),
            Self::Artifact(digest) => write!(f, "Artifact({digest})"),
            Self::Builder(key) => write!(f, "Builder({key})"),
            Self::Vulnerability(id) => write!(f, "Vulnerability({id})"),
            Self::Attestation(digest) => write!(f, "Attestation({digest})"),
        }
    }
}

/// Checks that every reference in `batch` resolves.
///
/// References to records introduced by the batch itself always resolve;
/// every other reference is handed to `stored`, which reports whether the
/// backend already holds the target.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] naming up to five missing references, or
/// whatever `stored` fails with.
pub fn check_references(
    batch: &IngestBatch,
    mut stored: impl FnMut(Reference<'_>) -> Result<bool>,
) -> Result<()> {
    let index = BatchIndex::new(batch);
    let mut missing: BTreeSet<String> = BTreeSet::new();

    for reference in references(batch) {
        if !index.contains(reference) && !stored(reference)? {
            missing.insert(reference.to_string());
        }
    }

    if missing.is_empty() {
        return Ok(());
    }
    let listed: Vec<&str> = missing
        .iter()
        .take(MAX_REPORTED_MISSING)
        .map(String::as_str)
        .collect();
    let more = missing.len().saturating_sub(MAX_REPORTED_MISSING);
    let suffix = if more > 0 {
        format!(" and {more} more")
    } else {
        String::new()
    };
    Err(Error::InvalidInput(format!(
        "batch references unknown nodes: {}{suffix}",
        listed.join(", ")
    )))
}

fn references(batch: &IngestBatch) -> Vec<Reference<'_>> {
    let mut references = Vec::new();
    for record in &batch.artifacts {
        references.extend(record.built_by.iter().map(Reference::Builder));
        references.extend(record.depends_on.iter().map(Reference::Node));
    }
    for record in &batch.packages {
        references.extend(record.contains.iter().map(Reference::Artifact));
        references.extend(record.depends_on.iter().map(Reference::Node));
    }
    for record in &batch.attestations {
        references.extend(record.attested_objects.iter().map(Reference::Node));
        references.extend(record.vulnerabilities.iter().map(Reference::Vulnerability));
    }
    for record in &batch.metadata {
        references.extend(record.attached_to.iter().map(Reference::Node));
    }
    for record in &batch.identities {
        references.extend(record.attestations.iter().map(Reference::Attestation));
    }
    references
}

/// Identities introduced by a batch.
struct BatchIndex<'a> {
    artifacts: BTreeSet<&'a Digest>,
    packages: BTreeSet<&'a Purl>,
    builders: BTreeSet<BuilderKey>,
    vulnerabilities: BTreeSet<&'a NaturalId>,
    attestations: BTreeSet<&'a Digest>,
}

impl<'a> BatchIndex<'a> {
    fn new(batch: &'a IngestBatch) -> Self {
        Self {
            artifacts: batch.artifacts.iter().map(|r| &r.digest).collect(),
            packages: batch.packages.iter().map(|r| &r.purl).collect(),
            builders: batch.builders.iter().map(Builder::key).collect(),
            vulnerabilities: batch.vulnerabilities.iter().map(|v| &v.id).collect(),
            attestations: batch.attestations.iter().map(|a| &a.digest).collect(),
        }
    }

    fn contains(&self, reference: Reference<'_>) -> bool {
        match reference {
            Reference::Node(NodeRef::Artifact { digest }) | Reference::Artifact(digest) => {
                self.artifacts.contains(digest)
            },
            Reference::Node(NodeRef::Package { purl }) => self.packages.contains(purl),
            Reference::Builder(key) => self.builders.contains(key),
            Reference::Vulnerability(id) => self.vulnerabilities.contains(id),
            Reference::Attestation(digest) => self.attestations.contains(digest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetadataPayload, ScorecardPayload};

    fn digest(s: &str) -> Digest {
        Digest::new(s).unwrap()
    }

    #[test]
    fn test_apply_accepts_references_within_batch() {
        let batch = IngestBatch::new()
            .with_artifact(
                ArtifactRecord::new("sha256:app")
                    .unwrap()
                    .depends_on(NodeRef::package("pkg:npm/x@1").unwrap())
                    .built_by(BuilderKey::new("gha", "r1").unwrap()),
            )
            .with_package(PackageRecord::new("pkg:npm/x@1").unwrap().contains(digest("sha256:lib")))
            .with_artifact(ArtifactRecord::new("sha256:lib").unwrap())
            .with_builder(Builder::new("gha", "r1").unwrap());

        let mut snapshot = GraphSnapshot::new();
        let summary = snapshot.apply(&batch).unwrap();

        assert_eq!(summary.total(), 4);
        assert_eq!(snapshot.node_count(), 4);
    }

    #[test]
    fn test_apply_accepts_references_to_existing_nodes() {
        let mut snapshot = GraphSnapshot::new();
        snapshot
            .apply(&IngestBatch::new().with_vulnerability(Vulnerability::new("CVE-1").unwrap()))
            .unwrap();

        let batch = IngestBatch::new().with_attestation(
            AttestationRecord::new("sha256:att")
                .unwrap()
                .references(NaturalId::new("CVE-1").unwrap()),
        );
        assert!(snapshot.apply(&batch).is_ok());
    }

    #[test]
    fn test_apply_rejects_dangling_reference_atomically() {
        let mut snapshot = GraphSnapshot::new();
        let batch = IngestBatch::new()
            .with_artifact(ArtifactRecord::new("sha256:ok").unwrap())
            .with_artifact(
                ArtifactRecord::new("sha256:app")
                    .unwrap()
                    .depends_on(NodeRef::package("pkg:npm/missing@1").unwrap()),
            );

        let err = snapshot.apply(&batch).unwrap_err();
        assert!(
            matches!(err, Error::InvalidInput(ref msg) if msg.contains("Package(pkg:npm/missing@1)"))
        );
        assert_eq!(snapshot.node_count(), 0);
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let batch = IngestBatch::new()
            .with_artifact(ArtifactRecord::new("sha256:a").unwrap().with_tags(["x"]))
            .with_identity(IdentityRecord::new("sha256:k", "alice").unwrap());
        let mut snapshot = GraphSnapshot::new();
        snapshot.apply(&batch).unwrap();
        let once = snapshot.clone();
        snapshot.apply(&batch).unwrap();
        assert_eq!(snapshot, once);
    }

    #[test]
    fn test_rejection_message_is_bounded() {
        let mut record = ArtifactRecord::new("sha256:app").unwrap();
        for i in 0..8 {
            record = record.depends_on(NodeRef::artifact(&format!("sha256:m{i}")).unwrap());
        }
        let err = GraphSnapshot::new()
            .apply(&IngestBatch::new().with_artifact(record))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.ends_with("and 3 more")));
    }

    #[test]
    fn test_apply_rejects_non_finite_score() {
        let mut snapshot = GraphSnapshot::new();
        let batch = IngestBatch::new()
            .with_artifact(ArtifactRecord::new("sha256:app").unwrap())
            .with_metadata(
                MetadataRecord::new("scorecard", "app")
                    .unwrap()
                    .attached_to(NodeRef::artifact("sha256:app").unwrap())
                    .with_payload(MetadataPayload::Scorecard(ScorecardPayload {
                        aggregate_score: f64::INFINITY,
                        ..ScorecardPayload::default()
                    })),
            );

        let err = snapshot.apply(&batch).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("scorecard/app")));
        assert_eq!(snapshot.node_count(), 0);
    }

    #[test]
    fn test_check_references_only_looks_up_targets_outside_batch() {
        let batch = IngestBatch::new()
            .with_artifact(
                ArtifactRecord::new("sha256:app")
                    .unwrap()
                    .depends_on(NodeRef::artifact("sha256:lib").unwrap())
                    .depends_on(NodeRef::package("pkg:npm/stored@1").unwrap()),
            )
            .with_artifact(ArtifactRecord::new("sha256:lib").unwrap());

        let mut looked_up = Vec::new();
        check_references(&batch, |reference| {
            looked_up.push(reference.to_string());
            Ok(true)
        })
        .unwrap();
        assert_eq!(looked_up, ["Package(pkg:npm/stored@1)"]);
    }
}
