//! Closed tagged unions and their resolution rule.
//!
//! Polymorphic edges terminate at one of a fixed set of node shapes. On the
//! wire every union value carries a `__typename` discriminant; resolution
//! reads it, checks it against the declared variant set and only then decodes
//! the body. A value whose discriminant or shape matches none of the variants
//! fails with [`Error::UnknownVariant`] and is never coerced to a default.

use crate::models::{Artifact, Digest, Package, Purl};
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Name of the discriminant field carried by every union value.
pub const TYPENAME_FIELD: &str = "__typename";

/// A closed union with a runtime discriminant.
pub trait TaggedUnion: Sized + Serialize + DeserializeOwned {
    /// Copyable discriminant type.
    type Kind: Copy + Eq + fmt::Debug;

    /// Union name used in errors.
    const UNION: &'static str;

    /// Wire discriminants of every declared variant.
    const VARIANTS: &'static [&'static str];

    /// Returns the discriminant of this value.
    fn kind(&self) -> Self::Kind;

    /// Returns the wire discriminant (`__typename`) of this value.
    fn type_name(&self) -> &'static str;

    /// Maps a wire discriminant to a declared variant.
    fn kind_for(type_name: &str) -> Option<Self::Kind>;

    /// Maps a wire discriminant to a declared variant, failing otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariant`] if `type_name` is not declared.
    fn require_kind(type_name: &str) -> Result<Self::Kind> {
        Self::kind_for(type_name).ok_or_else(|| Error::UnknownVariant {
            union: Self::UNION,
            found: type_name.to_string(),
            expected: Self::VARIANTS,
        })
    }
}

/// Resolves a union value from its JSON form.
///
/// Returns the discriminant together with the decoded variant.
///
/// # Errors
///
/// Returns [`Error::UnknownVariant`] if the value has no string `__typename`,
/// names an undeclared variant, or its body does not match the named
/// variant's shape.
pub fn resolve<U: TaggedUnion>(value: &Value) -> Result<(U::Kind, U)> {
    let Some(type_name) = value.get(TYPENAME_FIELD).and_then(Value::as_str) else {
        return Err(Error::UnknownVariant {
            union: U::UNION,
            found: describe_untagged(value),
            expected: U::VARIANTS,
        });
    };
    let kind = U::require_kind(type_name)?;

    let resolved: U =
        serde_json::from_value(value.clone()).map_err(|e| Error::UnknownVariant {
            union: U::UNION,
            found: format!("{type_name} with mismatched shape ({e})"),
            expected: U::VARIANTS,
        })?;

    // A decoded value always agrees with the tag it was decoded from.
    if resolved.kind() != kind {
        return Err(Error::UnknownVariant {
            union: U::UNION,
            found: type_name.to_string(),
            expected: U::VARIANTS,
        });
    }
    Ok((kind, resolved))
}

/// Resolves a union value from a JSON string.
///
/// # Errors
///
/// Returns [`Error::UnknownVariant`] as [`resolve`] does, or
/// [`Error::QueryFailed`] if `json` is not valid JSON.
pub fn resolve_str<U: TaggedUnion>(json: &str) -> Result<(U::Kind, U)> {
    let value: Value = serde_json::from_str(json).map_err(|e| Error::QueryFailed {
        operation: format!("decode_{}", U::UNION),
        cause: e.to_string(),
    })?;
    resolve(&value)
}

fn describe_untagged(value: &Value) -> String {
    match value {
        Value::Object(map) if map.contains_key(TYPENAME_FIELD) => {
            format!("non-string {TYPENAME_FIELD}")
        },
        Value::Object(_) => format!("object without {TYPENAME_FIELD}"),
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(_) => "array".to_string(),
    }
}

/// Discriminant of [`ArtifactOrPackage`] and [`NodeRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    /// An artifact node.
    Artifact,
    /// A package node.
    Package,
}

impl NodeKind {
    /// Returns the wire discriminant.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Artifact => "Artifact",
            Self::Package => "Package",
        }
    }

    /// Parses a wire discriminant.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Artifact" => Some(Self::Artifact),
            "Package" => Some(Self::Package),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge target that is either an artifact or a package, fully populated.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "__typename")]
pub enum ArtifactOrPackage {
    /// Artifact variant.
    Artifact(Artifact),
    /// Package variant.
    Package(Package),
}

impl ArtifactOrPackage {
    /// Returns the artifact, if this is the artifact variant.
    #[must_use]
    pub const fn as_artifact(&self) -> Option<&Artifact> {
        match self {
            Self::Artifact(artifact) => Some(artifact),
            Self::Package(_) => None,
        }
    }

    /// Returns the package, if this is the package variant.
    #[must_use]
    pub const fn as_package(&self) -> Option<&Package> {
        match self {
            Self::Package(package) => Some(package),
            Self::Artifact(_) => None,
        }
    }

    /// Returns the identity reference of the target node.
    #[must_use]
    pub fn node_ref(&self) -> NodeRef {
        match self {
            Self::Artifact(artifact) => NodeRef::Artifact {
                digest: artifact.digest.clone(),
            },
            Self::Package(package) => NodeRef::Package {
                purl: package.purl.clone(),
            },
        }
    }
}

impl TaggedUnion for ArtifactOrPackage {
    type Kind = NodeKind;

    const UNION: &'static str = "ArtifactOrPackage";
    const VARIANTS: &'static [&'static str] = &["Artifact", "Package"];

    fn kind(&self) -> NodeKind {
        match self {
            Self::Artifact(_) => NodeKind::Artifact,
            Self::Package(_) => NodeKind::Package,
        }
    }

    fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn kind_for(type_name: &str) -> Option<NodeKind> {
        NodeKind::parse(type_name)
    }
}

/// Identity reference to an artifact or a package.
///
/// Used by ingestion records, which carry edges by identity rather than by
/// value.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(tag = "__typename")]
pub enum NodeRef {
    /// Reference to an artifact by digest.
    Artifact {
        /// Artifact digest.
        digest: Digest,
    },
    /// Reference to a package by purl.
    Package {
        /// Package URL.
        purl: Purl,
    },
}

impl NodeRef {
    /// Creates an artifact reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the digest is malformed.
    pub fn artifact(digest: &str) -> Result<Self> {
        Ok(Self::Artifact {
            digest: Digest::new(digest)?,
        })
    }

    /// Creates a package reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the purl is blank.
    pub fn package(purl: &str) -> Result<Self> {
        Ok(Self::Package {
            purl: Purl::new(purl)?,
        })
    }

    /// Builds a reference from a stored discriminant and key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownVariant`] if `type_name` is not a declared
    /// variant, or [`Error::InvalidIdentity`] if `key` is malformed.
    pub fn from_parts(type_name: &str, key: &str) -> Result<Self> {
        match Self::require_kind(type_name)? {
            NodeKind::Artifact => Self::artifact(key),
            NodeKind::Package => Self::package(key),
        }
    }

    /// Returns the identity key (digest or purl string).
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Artifact { digest } => digest.as_str(),
            Self::Package { purl } => purl.as_str(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.key())
    }
}

impl TaggedUnion for NodeRef {
    type Kind = NodeKind;

    const UNION: &'static str = "ArtifactOrPackage";
    const VARIANTS: &'static [&'static str] = &["Artifact", "Package"];

    fn kind(&self) -> NodeKind {
        match self {
            Self::Artifact { .. } => NodeKind::Artifact,
            Self::Package { .. } => NodeKind::Package,
        }
    }

    fn type_name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn kind_for(type_name: &str) -> Option<NodeKind> {
        NodeKind::parse(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttestationPayload, MetadataPayload};
    use serde_json::json;

    #[test]
    fn test_resolve_artifact_variant() {
        let value = json!({
            "__typename": "Artifact",
            "digest": "sha256:abc",
            "name": "libfoo",
            "tags": [],
            "sourceInfo": null,
            "collectorInfo": null,
            "builtBy": [],
            "dependsOn": []
        });
        let (kind, resolved) = resolve::<ArtifactOrPackage>(&value).unwrap();
        assert_eq!(kind, NodeKind::Artifact);
        assert_eq!(resolved.kind(), NodeKind::Artifact);
        assert_eq!(resolved.as_artifact().unwrap().digest.as_str(), "sha256:abc");
        assert!(resolved.as_package().is_none());
    }

    #[test]
    fn test_resolve_package_variant() {
        let value = json!({"__typename": "Package", "purl": "pkg:npm/left-pad@1.3.0"});
        let (kind, resolved) = resolve::<ArtifactOrPackage>(&value).unwrap();
        assert_eq!(kind, NodeKind::Package);
        assert_eq!(
            resolved.as_package().unwrap().purl.as_str(),
            "pkg:npm/left-pad@1.3.0"
        );
    }

    #[test]
    fn test_resolve_rejects_unknown_tag() {
        let value = json!({"__typename": "Source", "digest": "sha256:abc"});
        let err = resolve::<ArtifactOrPackage>(&value).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownVariant { union: "ArtifactOrPackage", ref found, .. } if found == "Source"
        ));
        assert!(err.to_string().ends_with("(expected one of: Artifact, Package)"));
    }

    #[test]
    fn test_resolve_rejects_missing_tag() {
        // Shape looks like an artifact, but there is no default variant.
        let value = json!({"digest": "sha256:abc"});
        let err = resolve::<ArtifactOrPackage>(&value).unwrap_err();
        assert!(matches!(err, Error::UnknownVariant { .. }));
    }

    #[test]
    fn test_resolve_rejects_mismatched_shape() {
        let value = json!({"__typename": "Package", "digest": "sha256:abc"});
        let err = resolve::<ArtifactOrPackage>(&value).unwrap_err();
        assert!(matches!(err, Error::UnknownVariant { .. }));
    }

    #[test]
    fn test_resolve_payload_unions() {
        let err = resolve_str::<AttestationPayload>(r#"{"__typename":"SLSAPayload"}"#)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownVariant { union: "AttestationPayload", .. }
        ));

        let err = resolve_str::<MetadataPayload>(r#"{"__typename":"VEXPayload"}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownVariant { union: "MetadataPayload", .. }));
    }

    #[test]
    fn test_node_ref_from_parts() {
        let node = NodeRef::from_parts("Package", "pkg:cargo/serde@1.0.0").unwrap();
        assert_eq!(node.kind(), NodeKind::Package);
        assert_eq!(node.key(), "pkg:cargo/serde@1.0.0");
        assert_eq!(node.to_string(), "Package(pkg:cargo/serde@1.0.0)");

        assert!(matches!(
            NodeRef::from_parts("Builder", "x"),
            Err(Error::UnknownVariant { .. })
        ));
        assert!(matches!(
            NodeRef::from_parts("Artifact", "nocolon"),
            Err(Error::InvalidIdentity { .. })
        ));
    }

    #[test]
    fn test_node_ref_wire_form() {
        let node = NodeRef::artifact("sha256:abc").unwrap();
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json, json!({"__typename": "Artifact", "digest": "sha256:abc"}));
    }
}
