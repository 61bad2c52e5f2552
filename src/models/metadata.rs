//! Metadata nodes.

use crate::models::provenance::impl_provenance;
use crate::models::{
    ArtifactOrPackage, MetadataKey, MetadataPayload, NaturalId, NodeInfo, insert_sorted_unique,
};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Auxiliary facts (scorecards, ...) attached to artifacts or packages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Metadata type.
    #[serde(rename = "type")]
    pub metadata_type: NaturalId,
    /// Metadata id, unique within its type.
    pub id: NaturalId,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Nodes the metadata is attached to.
    #[serde(default)]
    pub attached_to: Vec<ArtifactOrPackage>,
    /// Typed payload, if any.
    #[serde(default)]
    pub payload: Option<MetadataPayload>,
}

impl Metadata {
    /// Creates a metadata node with no edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if either part of the identity is blank.
    pub fn new(metadata_type: &str, id: &str) -> Result<Self> {
        Ok(Self::from_key(MetadataKey::new(metadata_type, id)?))
    }

    /// Creates a metadata node from a validated key.
    #[must_use]
    pub fn from_key(key: MetadataKey) -> Self {
        Self {
            metadata_type: key.metadata_type,
            id: key.id,
            node_info: NodeInfo::new(),
            attached_to: Vec::new(),
            payload: None,
        }
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: MetadataPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attaches the metadata to a node.
    #[must_use]
    pub fn with_target(mut self, target: ArtifactOrPackage) -> Self {
        insert_sorted_unique(&mut self.attached_to, target, ArtifactOrPackage::node_ref);
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
}

impl_provenance!(Metadata);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Package, ScorecardPayload};

    #[test]
    fn test_metadata_shape() {
        let metadata = Metadata::new("scorecard", "github.com/example/repo@abc")
            .unwrap()
            .with_payload(MetadataPayload::Scorecard(ScorecardPayload {
                repo: "github.com/example/repo".into(),
                commit: "abc".into(),
                scorecard_version: "v4".into(),
                scorecard_commit: "def".into(),
                aggregate_score: 8.2,
            }))
            .with_target(ArtifactOrPackage::Package(Package::new("pkg:github/example/repo").unwrap()));
        let json = serde_json::to_value(&metadata).unwrap();

        assert_eq!(json["type"], "scorecard");
        assert_eq!(json["payload"]["__typename"], "ScorecardPayload");
        assert_eq!(json["payload"]["aggregate_score"], 8.2);
        assert_eq!(json["attachedTo"][0]["__typename"], "Package");
    }
}
