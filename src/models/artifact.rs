//! Artifact and builder nodes.

use crate::models::provenance::impl_provenance;
use crate::models::{
    ArtifactOrPackage, BuilderKey, Digest, NaturalId, NodeInfo, NodeRef, insert_sorted_unique,
};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A file or blob identified by its content digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Content digest (`algorithm:value`).
    pub digest: Digest,
    /// Human-readable name.
    #[serde(default)]
    pub name: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Builders that produced this artifact, unique by `(type, id)`.
    #[serde(default)]
    pub built_by: Vec<Builder>,
    /// Dependencies, unique by target identity.
    #[serde(default)]
    pub depends_on: Vec<ArtifactOrPackage>,
}

impl Artifact {
    /// Creates an artifact with no attributes or edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if the digest is malformed.
    pub fn new(digest: &str) -> Result<Self> {
        Ok(Self::with_digest(Digest::new(digest)?))
    }

    /// Creates an artifact from an already validated digest.
    #[must_use]
    pub const fn with_digest(digest: Digest) -> Self {
        Self {
            digest,
            name: None,
            tags: BTreeSet::new(),
            node_info: NodeInfo::new(),
            built_by: Vec::new(),
            depends_on: Vec::new(),
        }
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

    /// Adds a builder edge. A builder with the same key replaces the old one.
    #[must_use]
    pub fn with_builder(mut self, builder: Builder) -> Self {
        insert_sorted_unique(&mut self.built_by, builder, Builder::key);
        self
    }

    /// Adds a dependency edge. A target with the same identity replaces the old one.
    #[must_use]
    pub fn with_dependency(mut self, dependency: ArtifactOrPackage) -> Self {
        insert_sorted_unique(&mut self.depends_on, dependency, ArtifactOrPackage::node_ref);
        self
    }

    /// Returns the identity reference of this artifact.
    #[must_use]
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::Artifact {
            digest: self.digest.clone(),
        }
    }
}

/// The entity (CI system, build service) that produced an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Builder {
    /// Builder type.
    #[serde(rename = "type")]
    pub builder_type: NaturalId,
    /// Builder id, unique within its type.
    pub id: NaturalId,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
}

impl Builder {
    /// Creates a builder.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if either part of the identity is blank.
    pub fn new(builder_type: &str, id: &str) -> Result<Self> {
        let key = BuilderKey::new(builder_type, id)?;
        Ok(Self::from_key(key))
    }

    /// Creates a builder from a validated key.
    #[must_use]
    pub fn from_key(key: BuilderKey) -> Self {
        Self {
            builder_type: key.builder_type,
            id: key.id,
            node_info: NodeInfo::new(),
        }
    }

    /// Sets provenance info.
    #[must_use]
    pub fn with_node_info(mut self, node_info: NodeInfo) -> Self {
        self.node_info = node_info;
        self
    }

    /// Returns the composite identity.
    #[must_use]
    pub fn key(&self) -> BuilderKey {
        BuilderKey {
            builder_type: self.builder_type.clone(),
            id: self.id.clone(),
        }
    }
}

impl_provenance!(Artifact, Builder);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Package, Provenance};
    use crate::Error;

    #[test]
    fn test_artifact_requires_valid_digest() {
        assert!(Artifact::new("sha256:abc").is_ok());
        assert!(matches!(
            Artifact::new("abc"),
            Err(Error::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn test_artifact_serializes_graphql_shape() {
        let artifact = Artifact::new("sha256:abc")
            .unwrap()
            .with_name("libfoo")
            .with_tags(["release", "release", "amd64"])
            .with_node_info(NodeInfo::new().with_collector("file-collector"));
        let json = serde_json::to_value(&artifact).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "digest": "sha256:abc",
                "name": "libfoo",
                "tags": ["amd64", "release"],
                "sourceInfo": null,
                "collectorInfo": "file-collector",
                "builtBy": [],
                "dependsOn": []
            })
        );
        assert_eq!(artifact.collector_info(), Some("file-collector"));
        assert_eq!(artifact.source_info(), None);
    }

    #[test]
    fn test_edges_are_duplicate_free() {
        let builder = Builder::new("github-actions", "runner-1").unwrap();
        let package = Package::new("pkg:cargo/serde@1.0.0").unwrap();
        let artifact = Artifact::new("sha256:abc")
            .unwrap()
            .with_builder(builder.clone())
            .with_builder(builder)
            .with_dependency(ArtifactOrPackage::Package(package.clone()))
            .with_dependency(ArtifactOrPackage::Package(package));

        assert_eq!(artifact.built_by.len(), 1);
        assert_eq!(artifact.depends_on.len(), 1);
    }

    #[test]
    fn test_dependencies_carry_typename() {
        let artifact = Artifact::new("sha256:abc").unwrap().with_dependency(
            ArtifactOrPackage::Artifact(Artifact::new("sha256:def").unwrap()),
        );
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["dependsOn"][0]["__typename"], "Artifact");
        assert_eq!(json["dependsOn"][0]["digest"], "sha256:def");
    }

    #[test]
    fn test_builder_json_uses_type() {
        let builder = Builder::new("slsa-github-generator", "v1").unwrap();
        let json = serde_json::to_value(&builder).unwrap();
        assert_eq!(json["type"], "slsa-github-generator");
        assert_eq!(json["id"], "v1");
    }
}
