//! Flat ingestion records.
//!
//! Ingestion collaborators hand the graph fully-formed, post-parse records.
//! Unlike the query-side entities, records carry their edges by identity
//! ([`NodeRef`], [`BuilderKey`], [`Digest`], ...) so that a batch can be
//! validated and upserted without first materializing the graph.
//!
//! Re-ingesting a record with an existing identity merges into the stored
//! record: present optional scalars replace stored ones, absent ones keep the
//! stored value, and every set (tags, digests, edges) is unioned.

use crate::models::union::{TYPENAME_FIELD, TaggedUnion, resolve};
use crate::models::{
    AttestationPayload, Builder, BuilderKey, Digest, MetadataKey, MetadataPayload, NaturalId,
    NodeInfo, NodeKind, NodeRef, Purl, Vulnerability,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

fn merge_option(stored: &mut Option<String>, newer: &Option<String>) {
    if newer.is_some() {
        stored.clone_from(newer);
    }
}

/// Artifact as ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Content digest.
    pub digest: Digest,
    /// Name.
    #[serde(default)]
    pub name: Option<String>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Builders by key.
    #[serde(default)]
    pub built_by: BTreeSet<BuilderKey>,
    /// Dependencies by reference.
    #[serde(default)]
    pub depends_on: BTreeSet<NodeRef>,
}

impl ArtifactRecord {
    /// Creates an artifact record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the digest is malformed.
    pub fn new(digest: &str) -> Result<Self> {
        Ok(Self {
            digest: Digest::new(digest)?,
            name: None,
            tags: BTreeSet::new(),
            node_info: NodeInfo::new(),
            built_by: BTreeSet::new(),
            depends_on: BTreeSet::new(),
        })
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets provenance info.
    #[must_use]
    pub fn with_node_info(mut self, node_info: NodeInfo) -> Self {
        self.node_info = node_info;
        self
    }

    /// Adds a builder reference.
    #[must_use]
    pub fn built_by(mut self, key: BuilderKey) -> Self {
        self.built_by.insert(key);
        self
    }

    /// Adds a dependency reference.
    #[must_use]
    pub fn depends_on(mut self, target: NodeRef) -> Self {
        self.depends_on.insert(target);
        self
    }

    /// Merges a re-ingested record into this one.
    pub fn merge(&mut self, newer: &Self) {
        merge_option(&mut self.name, &newer.name);
        self.tags.extend(newer.tags.iter().cloned());
        self.node_info.merge(&newer.node_info);
        self.built_by.extend(newer.built_by.iter().cloned());
        self.depends_on.extend(newer.depends_on.iter().cloned());
    }
}

/// Package as ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    /// Package URL.
    pub purl: Purl,
    /// Name.
    #[serde(default)]
    pub name: Option<String>,
    /// Version.
    #[serde(default)]
    pub version: Option<String>,
    /// Archive digests.
    #[serde(default)]
    pub digests: BTreeSet<Digest>,
    /// CPE identifiers.
    #[serde(default)]
    pub cpes: BTreeSet<String>,
    /// Tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Contained artifacts by digest.
    #[serde(default)]
    pub contains: BTreeSet<Digest>,
    /// Dependencies by reference.
    #[serde(default)]
    pub depends_on: BTreeSet<NodeRef>,
}

impl PackageRecord {
    /// Creates a package record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the purl is blank.
    pub fn new(purl: &str) -> Result<Self> {
        Ok(Self {
            purl: Purl::new(purl)?,
            name: None,
            version: None,
            digests: BTreeSet::new(),
            cpes: BTreeSet::new(),
            tags: BTreeSet::new(),
            node_info: NodeInfo::new(),
            contains: BTreeSet::new(),
            depends_on: BTreeSet::new(),
        })
    }

    /// Sets the name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets provenance info.
    #[must_use]
    pub fn with_node_info(mut self, node_info: NodeInfo) -> Self {
        self.node_info = node_info;
        self
    }

    /// Adds a contained artifact reference.
    #[must_use]
    pub fn contains(mut self, digest: Digest) -> Self {
        self.contains.insert(digest);
        self
    }

    /// Adds a dependency reference.
    #[must_use]
    pub fn depends_on(mut self, target: NodeRef) -> Self {
        self.depends_on.insert(target);
        self
    }

    /// Merges a re-ingested record into this one.
    pub fn merge(&mut self, newer: &Self) {
        merge_option(&mut self.name, &newer.name);
        merge_option(&mut self.version, &newer.version);
        self.digests.extend(newer.digests.iter().cloned());
        self.cpes.extend(newer.cpes.iter().cloned());
        self.tags.extend(newer.tags.iter().cloned());
        self.node_info.merge(&newer.node_info);
        self.contains.extend(newer.contains.iter().cloned());
        self.depends_on.extend(newer.depends_on.iter().cloned());
    }
}

/// Attestation as ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationRecord {
    /// Attestation digest.
    pub digest: Digest,
    /// File path.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Attestation type.
    #[serde(rename = "type", default)]
    pub attestation_type: Option<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Subjects by reference.
    #[serde(default)]
    pub attested_objects: BTreeSet<NodeRef>,
    /// Vulnerabilities by id.
    #[serde(default)]
    pub vulnerabilities: BTreeSet<NaturalId>,
    /// Payload.
    #[serde(default)]
    pub payload: Option<AttestationPayload>,
}

impl AttestationRecord {
    /// Creates an attestation record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the digest is malformed.
    pub fn new(digest: &str) -> Result<Self> {
        Ok(Self {
            digest: Digest::new(digest)?,
            file_path: None,
            attestation_type: None,
            node_info: NodeInfo::new(),
            attested_objects: BTreeSet::new(),
            vulnerabilities: BTreeSet::new(),
            payload: None,
        })
    }

    /// Sets the attestation type.
    #[must_use]
    pub fn with_type(mut self, attestation_type: impl Into<String>) -> Self {
        self.attestation_type = Some(attestation_type.into());
        self
    }

    /// Sets the file path.
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: AttestationPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a subject reference.
    #[must_use]
    pub fn attests(mut self, subject: NodeRef) -> Self {
        self.attested_objects.insert(subject);
        self
    }

    /// Adds a vulnerability reference.
    #[must_use]
    pub fn references(mut self, vulnerability: NaturalId) -> Self {
        self.vulnerabilities.insert(vulnerability);
        self
    }

    /// Merges a re-ingested record into this one.
    pub fn merge(&mut self, newer: &Self) {
        merge_option(&mut self.file_path, &newer.file_path);
        merge_option(&mut self.attestation_type, &newer.attestation_type);
        self.node_info.merge(&newer.node_info);
        self.attested_objects
            .extend(newer.attested_objects.iter().cloned());
        self.vulnerabilities
            .extend(newer.vulnerabilities.iter().cloned());
        if newer.payload.is_some() {
            self.payload.clone_from(&newer.payload);
        }
    }
}

/// Metadata as ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    /// Metadata type.
    #[serde(rename = "type")]
    pub metadata_type: NaturalId,
    /// Metadata id.
    pub id: NaturalId,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Targets by reference.
    #[serde(default)]
    pub attached_to: BTreeSet<NodeRef>,
    /// Payload.
    #[serde(default)]
    pub payload: Option<MetadataPayload>,
}

impl MetadataRecord {
    /// Creates a metadata record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if either part of the identity is blank.
    pub fn new(metadata_type: &str, id: &str) -> Result<Self> {
        let key = MetadataKey::new(metadata_type, id)?;
        Ok(Self {
            metadata_type: key.metadata_type,
            id: key.id,
            node_info: NodeInfo::new(),
            attached_to: BTreeSet::new(),
            payload: None,
        })
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: MetadataPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a target reference.
    #[must_use]
    pub fn attached_to(mut self, target: NodeRef) -> Self {
        self.attached_to.insert(target);
        self
    }

    /// Returns the composite identity.
    #[must_use]
    pub fn key(&self) -> MetadataKey {
        MetadataKey {
            metadata_type: self.metadata_type.clone(),
            id: self.id.clone(),
        }
    }

    /// Merges a re-ingested record into this one.
    pub fn merge(&mut self, newer: &Self) {
        self.node_info.merge(&newer.node_info);
        self.attached_to.extend(newer.attached_to.iter().cloned());
        if newer.payload.is_some() {
            self.payload.clone_from(&newer.payload);
        }
    }
}

/// Signing identity as ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// Key digest.
    pub digest: Digest,
    /// Identity name.
    pub id: String,
    /// Public key.
    #[serde(default)]
    pub key: Option<String>,
    /// Key type.
    #[serde(default)]
    pub key_type: Option<String>,
    /// Signature scheme.
    #[serde(default)]
    pub key_scheme: Option<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Signed attestations by digest.
    #[serde(default)]
    pub attestations: BTreeSet<Digest>,
}

impl IdentityRecord {
    /// Creates an identity record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the digest is malformed.
    pub fn new(digest: &str, id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            digest: Digest::new(digest)?,
            id: id.into(),
            key: None,
            key_type: None,
            key_scheme: None,
            node_info: NodeInfo::new(),
            attestations: BTreeSet::new(),
        })
    }

    /// Adds a signed attestation reference.
    #[must_use]
    pub fn signed(mut self, attestation: Digest) -> Self {
        self.attestations.insert(attestation);
        self
    }

    /// Merges a re-ingested record into this one.
    ///
    /// The `id` attribute is required, so the newer value always wins.
    pub fn merge(&mut self, newer: &Self) {
        self.id.clone_from(&newer.id);
        merge_option(&mut self.key, &newer.key);
        merge_option(&mut self.key_type, &newer.key_type);
        merge_option(&mut self.key_scheme, &newer.key_scheme);
        self.node_info.merge(&newer.node_info);
        self.attestations.extend(newer.attestations.iter().cloned());
    }
}

/// A batch of records to upsert together.
///
/// A batch is applied atomically: either every record is merged into the
/// backend or, if any reference cannot be resolved, none is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestBatch {
    /// Artifact records.
    pub artifacts: Vec<ArtifactRecord>,
    /// Package records.
    pub packages: Vec<PackageRecord>,
    /// Builders.
    pub builders: Vec<Builder>,
    /// Attestation records.
    pub attestations: Vec<AttestationRecord>,
    /// Metadata records.
    pub metadata: Vec<MetadataRecord>,
    /// Identity records.
    pub identities: Vec<IdentityRecord>,
    /// Vulnerabilities.
    pub vulnerabilities: Vec<Vulnerability>,
}

impl IngestBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a batch from JSON.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] if the text is not JSON or a record is
    ///   missing a field or has a field of the wrong type
    /// - [`Error::InvalidIdentity`] if any identity inside it is malformed
    /// - [`Error::UnknownVariant`] if a node reference or payload carries an
    ///   undeclared `__typename`
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("ingest batch: {e}")))?;
        raw::check_batch(&value)?;
        serde_json::from_value(value)
            .map_err(|e| Error::InvalidInput(format!("ingest batch: {e}")))
    }

    /// Checks record values that no identity or reference rule covers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a scorecard aggregate score is NaN
    /// or infinite.
    pub fn check_values(&self) -> Result<()> {
        let non_finite = self.metadata.iter().find_map(|record| match &record.payload {
            Some(MetadataPayload::Scorecard(scorecard))
                if !scorecard.aggregate_score.is_finite() =>
            {
                Some((record.key(), scorecard.aggregate_score))
            },
            _ => None,
        });
        match non_finite {
            Some((key, score)) => Err(Error::InvalidInput(format!(
                "metadata {key}: aggregate score must be finite, got {score}"
            ))),
            None => Ok(()),
        }
    }

    /// Adds an artifact record.
    #[must_use]
    pub fn with_artifact(mut self, record: ArtifactRecord) -> Self {
        self.artifacts.push(record);
        self
    }

    /// Adds a package record.
    #[must_use]
    pub fn with_package(mut self, record: PackageRecord) -> Self {
        self.packages.push(record);
        self
    }

    /// Adds a builder.
    #[must_use]
    pub fn with_builder(mut self, builder: Builder) -> Self {
        self.builders.push(builder);
        self
    }

    /// Adds an attestation record.
    #[must_use]
    pub fn with_attestation(mut self, record: AttestationRecord) -> Self {
        self.attestations.push(record);
        self
    }

    /// Adds a metadata record.
    #[must_use]
    pub fn with_metadata(mut self, record: MetadataRecord) -> Self {
        self.metadata.push(record);
        self
    }

    /// Adds an identity record.
    #[must_use]
    pub fn with_identity(mut self, record: IdentityRecord) -> Self {
        self.identities.push(record);
        self
    }

    /// Adds a vulnerability.
    #[must_use]
    pub fn with_vulnerability(mut self, vulnerability: Vulnerability) -> Self {
        self.vulnerabilities.push(vulnerability);
        self
    }

    /// Returns the total number of records in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
            + self.packages.len()
            + self.builders.len()
            + self.attestations.len()
            + self.metadata.len()
            + self.identities.len()
            + self.vulnerabilities.len()
    }

    /// Returns true if the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity and union checks on a batch before it is decoded.
///
/// Serde flattens every failure into one message, so these run first and
/// report the precise error kind. Fields that are missing or of the wrong
/// JSON type are skipped here and left to the decoder.
mod raw {
    use super::*;

    pub(super) fn check_batch(batch: &Value) -> Result<()> {
        for record in items(batch, "artifacts") {
            identity(record, "digest", Digest::new)?;
            for key in items(record, "builtBy") {
                builder_key(key)?;
            }
            for node in items(record, "dependsOn") {
                node_ref(node)?;
            }
        }
        for record in items(batch, "packages") {
            identity(record, "purl", Purl::new)?;
            for digest in items(record, "digests").chain(items(record, "contains")) {
                value(digest, Digest::new)?;
            }
            for node in items(record, "dependsOn") {
                node_ref(node)?;
            }
        }
        for builder in items(batch, "builders") {
            builder_key(builder)?;
        }
        for record in items(batch, "attestations") {
            identity(record, "digest", Digest::new)?;
            for node in items(record, "attestedObjects") {
                node_ref(node)?;
            }
            for id in items(record, "vulnerabilities") {
                value(id, NaturalId::new)?;
            }
            payload::<AttestationPayload>(record)?;
        }
        for record in items(batch, "metadata") {
            identity(record, "type", NaturalId::new)?;
            identity(record, "id", NaturalId::new)?;
            for node in items(record, "attachedTo") {
                node_ref(node)?;
            }
            payload::<MetadataPayload>(record)?;
        }
        for record in items(batch, "identities") {
            identity(record, "digest", Digest::new)?;
            for digest in items(record, "attestations") {
                value(digest, Digest::new)?;
            }
        }
        for record in items(batch, "vulnerabilities") {
            identity(record, "id", NaturalId::new)?;
        }
        Ok(())
    }

    fn items<'a>(value: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
        value.get(field).and_then(Value::as_array).into_iter().flatten()
    }

    fn value<T>(raw: &Value, parse: impl Fn(String) -> Result<T>) -> Result<()> {
        match raw.as_str() {
            Some(text) => parse(text.to_string()).map(drop),
            None => Ok(()),
        }
    }

    fn identity<T>(
        record: &Value,
        field: &str,
        parse: impl Fn(String) -> Result<T>,
    ) -> Result<()> {
        record.get(field).map_or(Ok(()), |raw| value(raw, parse))
    }

    fn builder_key(key: &Value) -> Result<()> {
        identity(key, "type", NaturalId::new)?;
        identity(key, "id", NaturalId::new)
    }

    fn node_ref(node: &Value) -> Result<()> {
        let Some(type_name) = node.get(TYPENAME_FIELD).and_then(Value::as_str) else {
            return resolve::<NodeRef>(node).map(drop);
        };
        match NodeRef::require_kind(type_name)? {
            NodeKind::Artifact => identity(node, "digest", Digest::new),
            NodeKind::Package => identity(node, "purl", Purl::new),
        }
    }

    fn payload<U: TaggedUnion>(record: &Value) -> Result<()> {
        match record.get("payload") {
            None | Some(Value::Null) => Ok(()),
            Some(payload) => resolve::<U>(payload).map(drop),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_merge_unions_and_keeps_known_scalars() {
        let builder = BuilderKey::new("github-actions", "runner-1").unwrap();
        let mut stored = ArtifactRecord::new("sha256:abc")
            .unwrap()
            .with_name("libfoo")
            .with_tags(["a"])
            .built_by(builder.clone());
        let newer = ArtifactRecord::new("sha256:abc")
            .unwrap()
            .with_tags(["b"])
            .built_by(builder)
            .depends_on(NodeRef::package("pkg:npm/x@1").unwrap());

        stored.merge(&newer);

        assert_eq!(stored.name.as_deref(), Some("libfoo"));
        assert_eq!(stored.tags.len(), 2);
        assert_eq!(stored.built_by.len(), 1);
        assert_eq!(stored.depends_on.len(), 1);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let record = PackageRecord::new("pkg:npm/x@1")
            .unwrap()
            .with_version("1")
            .contains(Digest::new("sha256:abc").unwrap());
        let mut merged = record.clone();
        merged.merge(&record);
        assert_eq!(merged, record);
    }

    #[test]
    fn test_batch_from_json() {
        let batch = IngestBatch::from_json(
            r#"{
                "artifacts": [{
                    "digest": "sha256:abc",
                    "builtBy": [{"type": "gha", "id": "r1"}],
                    "dependsOn": [{"__typename": "Package", "purl": "pkg:npm/x@1"}]
                }],
                "packages": [{"purl": "pkg:npm/x@1"}],
                "builders": [{"type": "gha", "id": "r1"}]
            }"#,
        )
        .unwrap();

        assert_eq!(batch.len(), 3);
        let dependency = batch.artifacts[0].depends_on.iter().next().unwrap();
        assert_eq!(dependency, &NodeRef::package("pkg:npm/x@1").unwrap());
    }

    #[test]
    fn test_batch_from_json_reports_bad_identity() {
        let err = IngestBatch::from_json(r#"{"artifacts": [{"digest": "nocolon"}]}"#).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidIdentity { entity: "digest", ref value, .. } if value == "nocolon"
        ));

        let err = IngestBatch::from_json(
            r#"{"artifacts": [{"digest": "sha256:abc", "builtBy": [{"type": " ", "id": "r1"}]}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_IDENTITY");

        let err = IngestBatch::from_json(
            r#"{"packages": [{"purl": "pkg:npm/x@1", "contains": ["sha256:"]}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_IDENTITY");
    }

    #[test]
    fn test_batch_from_json_reports_unknown_union_tag() {
        let err = IngestBatch::from_json(
            r#"{"artifacts": [{"digest": "sha256:abc", "dependsOn": [{"__typename": "Source", "digest": "sha256:x"}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownVariant { union: "ArtifactOrPackage", ref found, .. } if found == "Source"
        ));

        let err = IngestBatch::from_json(
            r#"{"attestations": [{"digest": "sha256:att", "payload": {"__typename": "SLSAPayload"}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownVariant { union: "AttestationPayload", .. }));
    }

    #[test]
    fn test_batch_from_json_keeps_invalid_input_for_malformed_documents() {
        for json in [r#"{"artifacts": ["#, r#"{"artifacts": [{"name": "no digest"}]}"#] {
            let err = IngestBatch::from_json(json).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{json}: {err:?}");
        }
    }

    #[test]
    fn test_check_values_rejects_nan_score() {
        let batch = IngestBatch::new().with_metadata(
            MetadataRecord::new("scorecard", "repo")
                .unwrap()
                .with_payload(MetadataPayload::Scorecard(crate::models::ScorecardPayload {
                    aggregate_score: f64::NAN,
                    ..Default::default()
                })),
        );
        let err = batch.check_values().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref msg) if msg.contains("NaN")));
    }
}
