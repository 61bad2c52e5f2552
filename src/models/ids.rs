//! Identity value types.
//!
//! Every node in the provenance graph is identified by one of these types.
//! They validate on construction and on deserialization, so an invalid
//! identity can never be observed inside a model value.
//!
//! | Type | Used by | Rule |
//! |------|---------|------|
//! | [`Digest`] | Artifact, Attestation, Identity | `algorithm:value`, both parts non-blank |
//! | [`Purl`] | Package | non-blank |
//! | [`NaturalId`] | Builder, Metadata, Vulnerability | non-blank, opaque |

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

fn invalid(entity: &'static str, value: &str, reason: &str) -> Error {
    Error::InvalidIdentity {
        entity,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn require_non_blank(entity: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(entity, value, "must not be empty"));
    }
    Ok(())
}

/// Content digest of the form `algorithm:value` (e.g. `sha256:abc...`).
///
/// The original string is kept verbatim; [`Digest::as_str`] reproduces it
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Parses a digest.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the value does not split on `:`
    /// into exactly two parts, or either part is empty or whitespace-only.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(invalid("digest", &value, "must not be empty"));
        }
        let mut parts = value.split(':');
        let algorithm = parts.next().unwrap_or_default();
        let Some(hash) = parts.next() else {
            return Err(invalid("digest", &value, "missing ':' separator"));
        };
        if parts.next().is_some() {
            return Err(invalid("digest", &value, "more than one ':' separator"));
        }
        if algorithm.trim().is_empty() {
            return Err(invalid("digest", &value, "empty algorithm"));
        }
        if hash.trim().is_empty() {
            return Err(invalid("digest", &value, "empty value"));
        }
        Ok(Self(value))
    }

    /// Computes the `sha256:<hex>` digest of a byte slice.
    #[must_use]
    pub fn sha256(bytes: &[u8]) -> Self {
        let hash = Sha256::digest(bytes);
        Self(format!("sha256:{}", hex::encode(hash)))
    }

    /// Returns the algorithm part (before the `:`).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map_or("", |(algorithm, _)| algorithm)
    }

    /// Returns the value part (after the `:`).
    #[must_use]
    pub fn value(&self) -> &str {
        self.0.split_once(':').map_or("", |(_, value)| value)
    }

    /// Returns the full digest string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Digest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Digest {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Package URL identifying a software package (e.g. `pkg:cargo/serde@1.0.0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Purl(String);

impl Purl {
    /// Creates a package URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        require_non_blank("purl", &value)?;
        Ok(Self(value))
    }

    /// Returns the purl string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Purl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Purl> for String {
    fn from(purl: Purl) -> Self {
        purl.0
    }
}

impl fmt::Display for Purl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque natural identifier (builder ids, metadata ids, vulnerability ids).
///
/// Compared case-sensitively and only within the entity type that owns it;
/// a `NaturalId` never takes part in cross-entity identity equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NaturalId(String);

impl NaturalId {
    /// Creates a natural identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if the value is blank.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        require_non_blank("id", &value)?;
        Ok(Self(value))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NaturalId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<NaturalId> for String {
    fn from(id: NaturalId) -> Self {
        id.0
    }
}

impl fmt::Display for NaturalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite `(type, id)` identity of a builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuilderKey {
    /// Builder type (e.g. `https://github.com/actions`).
    #[serde(rename = "type")]
    pub builder_type: NaturalId,
    /// Builder id.
    pub id: NaturalId,
}

impl BuilderKey {
    /// Creates a builder key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if either part is blank.
    pub fn new(builder_type: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            builder_type: NaturalId::new(builder_type)?,
            id: NaturalId::new(id)?,
        })
    }
}

impl fmt::Display for BuilderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.builder_type, self.id)
    }
}

/// Composite `(type, id)` identity of a metadata node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataKey {
    /// Metadata type (e.g. `scorecard`).
    #[serde(rename = "type")]
    pub metadata_type: NaturalId,
    /// Metadata id.
    pub id: NaturalId,
}

impl MetadataKey {
    /// Creates a metadata key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if either part is blank.
    pub fn new(metadata_type: impl Into<String>, id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            metadata_type: NaturalId::new(metadata_type)?,
            id: NaturalId::new(id)?,
        })
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.metadata_type, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_round_trips() {
        let digest = Digest::new("sha256:abc").unwrap();
        assert_eq!(digest.as_str(), "sha256:abc");
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.value(), "abc");
        assert_eq!(digest.to_string(), "sha256:abc");
    }

    #[test]
    fn test_digest_rejects_malformed() {
        for raw in ["", "  ", "sha256", ":abc", " :abc", "sha256:", "sha256:\t", ":", "sha256:a:b"] {
            let err = Digest::new(raw).unwrap_err();
            assert!(
                matches!(err, Error::InvalidIdentity { entity: "digest", .. }),
                "{raw:?} should be rejected, got {err:?}"
            );
        }
    }

    #[test]
    fn test_digest_deserialize_validates() {
        let ok: Digest = serde_json::from_str("\"sha1:deadbeef\"").unwrap();
        assert_eq!(ok.algorithm(), "sha1");

        let err = serde_json::from_str::<Digest>("\"deadbeef\"").unwrap_err();
        assert!(err.to_string().contains("missing ':' separator"));
    }

    #[test]
    fn test_digest_sha256() {
        let digest = Digest::sha256(b"");
        assert_eq!(
            digest.as_str(),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_purl_rejects_blank() {
        assert!(Purl::new("pkg:cargo/serde@1.0.0").is_ok());
        assert!(matches!(
            Purl::new("  "),
            Err(Error::InvalidIdentity { entity: "purl", .. })
        ));
    }

    #[test]
    fn test_natural_id_is_case_sensitive() {
        let upper = NaturalId::new("CVE-2024-0001").unwrap();
        let lower = NaturalId::new("cve-2024-0001").unwrap();
        assert_ne!(upper, lower);
    }

    #[test]
    fn test_builder_key_serde_uses_type_field() {
        let key = BuilderKey::new("github-actions", "runner-1").unwrap();
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["type"], "github-actions");
        assert_eq!(json["id"], "runner-1");

        let err = serde_json::from_value::<BuilderKey>(serde_json::json!({"type": "", "id": "x"}));
        assert!(err.is_err());
    }
}
