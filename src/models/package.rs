//! Package nodes.

use crate::models::provenance::impl_provenance;
use crate::models::{Artifact, ArtifactOrPackage, Digest, NodeInfo, NodeRef, Purl, insert_sorted_unique};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A software package identified by its package URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Package URL.
    pub purl: Purl,
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,
    /// Package version.
    #[serde(default)]
    pub version: Option<String>,
    /// Known digests of the package archive.
    #[serde(default)]
    pub digests: BTreeSet<Digest>,
    /// CPE identifiers.
    #[serde(default)]
    pub cpes: BTreeSet<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Artifacts shipped in the package, unique by digest.
    #[serde(default)]
    pub contains: Vec<Artifact>,
    /// Dependencies, unique by target identity.
    #[serde(default)]
    pub depends_on: Vec<ArtifactOrPackage>,
}

impl Package {
    /// Creates a package with no attributes or edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if the purl is blank.
    pub fn new(purl: &str) -> Result<Self> {
        Ok(Self::with_purl(Purl::new(purl)?))
    }

    /// Creates a package from an already validated purl.
    #[must_use]
    pub const fn with_purl(purl: Purl) -> Self {
        Self {
            purl,
            name: None,
            version: None,
            digests: BTreeSet::new(),
            cpes: BTreeSet::new(),
            tags: BTreeSet::new(),
            node_info: NodeInfo::new(),
            contains: Vec::new(),
            depends_on: Vec::new(),
        }
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

    /// Adds a known archive digest.
    #[must_use]
    pub fn with_digest(mut self, digest: Digest) -> Self {
        self.digests.insert(digest);
        self
    }

    /// Adds a CPE identifier.
    #[must_use]
    pub fn with_cpe(mut self, cpe: impl Into<String>) -> Self {
        self.cpes.insert(cpe.into());
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

    /// Adds a contained artifact.
    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        insert_sorted_unique(&mut self.contains, artifact, |a| a.digest.clone());
        self
    }

    /// Adds a dependency edge.
    #[must_use]
    pub fn with_dependency(mut self, dependency: ArtifactOrPackage) -> Self {
        insert_sorted_unique(&mut self.depends_on, dependency, ArtifactOrPackage::node_ref);
        self
    }

    /// Returns the identity reference of this package.
    #[must_use]
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::Package {
            purl: self.purl.clone(),
        }
    }
}

impl_provenance!(Package);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_shape() {
        let package = Package::new("pkg:cargo/serde@1.0.0")
            .unwrap()
            .with_name("serde")
            .with_version("1.0.0")
            .with_digest(Digest::new("sha256:aaa").unwrap())
            .with_cpe("cpe:2.3:a:serde:serde:1.0.0:*:*:*:*:*:*:*")
            .with_artifact(Artifact::new("sha256:bbb").unwrap());
        let json = serde_json::to_value(&package).unwrap();

        assert_eq!(json["purl"], "pkg:cargo/serde@1.0.0");
        assert_eq!(json["version"], "1.0.0");
        assert_eq!(json["digests"], serde_json::json!(["sha256:aaa"]));
        assert_eq!(json["contains"][0]["digest"], "sha256:bbb");
        assert!(json["dependsOn"].as_array().unwrap().is_empty());
        assert!(json["sourceInfo"].is_null());
    }

    #[test]
    fn test_contains_is_sorted_and_unique() {
        let package = Package::new("pkg:npm/a@1")
            .unwrap()
            .with_artifact(Artifact::new("sha256:ccc").unwrap())
            .with_artifact(Artifact::new("sha256:aaa").unwrap())
            .with_artifact(Artifact::new("sha256:ccc").unwrap().with_name("again"));

        let digests: Vec<_> = package.contains.iter().map(|a| a.digest.as_str()).collect();
        assert_eq!(digests, ["sha256:aaa", "sha256:ccc"]);
        assert_eq!(package.contains[1].name.as_deref(), Some("again"));
    }
}
