//! Entity and graph model.
//!
//! The provenance graph is built from seven node types, their identity value
//! types, payload values and three closed unions:
//!
//! | Node | Identity | Outgoing edges |
//! |------|----------|----------------|
//! | [`Artifact`] | [`Digest`] | `builtBy` → [`Builder`], `dependsOn` → [`ArtifactOrPackage`] |
//! | [`Package`] | [`Purl`] | `contains` → [`Artifact`], `dependsOn` → [`ArtifactOrPackage`] |
//! | [`Builder`] | [`BuilderKey`] | none |
//! | [`Attestation`] | [`Digest`] | `attestedObjects`, `vulnerabilities`, `payload` |
//! | [`Metadata`] | [`MetadataKey`] | `attachedTo`, `payload` |
//! | [`Identity`] | [`Digest`] | `attestations` → [`Attestation`] |
//! | [`Vulnerability`] | [`NaturalId`] | none |
//!
//! Every node implements [`Provenance`]. Query-side entities hold their edges
//! fully populated; ingestion [`record`] types hold them by identity.

mod artifact;
mod attestation;
mod ids;
mod metadata;
mod package;
mod payload;
mod provenance;
pub mod record;
pub mod union;

pub use artifact::{Artifact, Builder};
pub use attestation::{Attestation, Identity, Vulnerability};
pub use ids::{BuilderKey, Digest, MetadataKey, NaturalId, Purl};
pub use metadata::Metadata;
pub use package::Package;
pub use payload::{
    AttestationPayload, AttestationPayloadKind, MetadataPayload, MetadataPayloadKind,
    ScorecardPayload, VexInvocation, VexPayload, VexScanner, VexVulnerability,
};
pub use provenance::{NodeInfo, Provenance};
pub use record::{
    ArtifactRecord, AttestationRecord, IdentityRecord, IngestBatch, MetadataRecord, PackageRecord,
};
pub use union::{ArtifactOrPackage, NodeKind, NodeRef, TaggedUnion, resolve, resolve_str};

/// Inserts `item` into a vector kept sorted and unique by `key`.
///
/// An existing element with the same key is replaced.
pub(crate) fn insert_sorted_unique<T, K, F>(items: &mut Vec<T>, item: T, key: F)
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let item_key = key(&item);
    match items.binary_search_by(|candidate| key(candidate).cmp(&item_key)) {
        Ok(index) => items[index] = item,
        Err(index) => items.insert(index, item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sorted_unique() {
        let mut items = Vec::new();
        for value in [3, 1, 2, 3, 1] {
            insert_sorted_unique(&mut items, value, |v| *v);
        }
        assert_eq!(items, [1, 2, 3]);
    }
}
