//! Attestation, signer identity and vulnerability nodes.

use crate::models::provenance::impl_provenance;
use crate::models::{
    ArtifactOrPackage, AttestationPayload, Digest, NaturalId, NodeInfo, insert_sorted_unique,
};
use crate::Result;
use serde::{Deserialize, Serialize};

/// A signed statement about one or more artifacts or packages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// Digest of the attestation document.
    pub digest: Digest,
    /// Path of the attestation file, if it came from disk.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Attestation type (e.g. an in-toto predicate type).
    #[serde(rename = "type", default)]
    pub attestation_type: Option<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Subjects of the attestation.
    #[serde(default)]
    pub attested_objects: Vec<ArtifactOrPackage>,
    /// Vulnerabilities referenced by the attestation.
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    /// Typed payload, if any.
    #[serde(default)]
    pub payload: Option<AttestationPayload>,
}

impl Attestation {
    /// Creates an attestation with no attributes or edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if the digest is malformed.
    pub fn new(digest: &str) -> Result<Self> {
        Ok(Self::with_digest(Digest::new(digest)?))
    }

    /// Creates an attestation from an already validated digest.
    #[must_use]
    pub const fn with_digest(digest: Digest) -> Self {
        Self {
            digest,
            file_path: None,
            attestation_type: None,
            node_info: NodeInfo::new(),
            attested_objects: Vec::new(),
            vulnerabilities: Vec::new(),
            payload: None,
        }
    }

    /// Sets the file path.
    #[must_use]
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the attestation type.
    #[must_use]
    pub fn with_type(mut self, attestation_type: impl Into<String>) -> Self {
        self.attestation_type = Some(attestation_type.into());
        self
    }

    /// Sets the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: AttestationPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds an attested subject.
    #[must_use]
    pub fn with_subject(mut self, subject: ArtifactOrPackage) -> Self {
        insert_sorted_unique(&mut self.attested_objects, subject, ArtifactOrPackage::node_ref);
        self
    }

    /// Adds a referenced vulnerability.
    #[must_use]
    pub fn with_vulnerability(mut self, vulnerability: Vulnerability) -> Self {
        insert_sorted_unique(&mut self.vulnerabilities, vulnerability, |v| v.id.clone());
        self
    }
}

/// A signing identity and the attestations it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Digest of the identity's public key material.
    pub digest: Digest,
    /// Identity name (e.g. an email or SPIFFE id).
    pub id: String,
    /// Public key.
    #[serde(default)]
    pub key: Option<String>,
    /// Key type (e.g. `ecdsa`).
    #[serde(default)]
    pub key_type: Option<String>,
    /// Signature scheme (e.g. `ecdsa-sha2-nistp256`).
    #[serde(default)]
    pub key_scheme: Option<String>,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
    /// Attestations signed by this identity, unique by digest.
    #[serde(default)]
    pub attestations: Vec<Attestation>,
}

impl Identity {
    /// Creates an identity.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if the digest is malformed.
    pub fn new(digest: &str, id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            digest: Digest::new(digest)?,
            id: id.into(),
            key: None,
            key_type: None,
            key_scheme: None,
            node_info: NodeInfo::new(),
            attestations: Vec::new(),
        })
    }

    /// Sets key material.
    #[must_use]
    pub fn with_key(
        mut self,
        key: impl Into<String>,
        key_type: impl Into<String>,
        key_scheme: impl Into<String>,
    ) -> Self {
        self.key = Some(key.into());
        self.key_type = Some(key_type.into());
        self.key_scheme = Some(key_scheme.into());
        self
    }

    /// Adds a signed attestation.
    #[must_use]
    pub fn with_attestation(mut self, attestation: Attestation) -> Self {
        insert_sorted_unique(&mut self.attestations, attestation, |a| a.digest.clone());
        self
    }
}

/// A known vulnerability, identified by an opaque natural key (e.g. a CVE id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    /// Vulnerability id.
    pub id: NaturalId,
    /// Provenance info.
    #[serde(flatten)]
    pub node_info: NodeInfo,
}

impl Vulnerability {
    /// Creates a vulnerability.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIdentity`] if the id is blank.
    pub fn new(id: &str) -> Result<Self> {
        Ok(Self {
            id: NaturalId::new(id)?,
            node_info: NodeInfo::new(),
        })
    }

    /// Sets provenance info.
    #[must_use]
    pub fn with_node_info(mut self, node_info: NodeInfo) -> Self {
        self.node_info = node_info;
        self
    }
}

impl_provenance!(Attestation, Identity, Vulnerability);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Artifact, Provenance, VexInvocation, VexPayload, VexScanner};
    use crate::Error;

    fn vex() -> AttestationPayload {
        AttestationPayload::Vex(VexPayload::new(
            VexInvocation {
                parameters: vec!["-q".into(), "image".into(), "-q".into()],
                uri: "https://ci.example/1".into(),
                event_id: "e1".into(),
                producer_id: "p1".into(),
                scanned_on: "2024-01-01".into(),
            },
            VexScanner {
                uri: "trivy".into(),
                version: "0.49".into(),
                db_uri: "db".into(),
                db_version: "2".into(),
            },
        ))
    }

    #[test]
    fn test_attestation_round_trips_payload_parameters() {
        let attestation = Attestation::new("sha256:att")
            .unwrap()
            .with_type("https://openvex.dev/ns")
            .with_payload(vex())
            .with_subject(ArtifactOrPackage::Artifact(Artifact::new("sha256:abc").unwrap()));

        let json = serde_json::to_string(&attestation).unwrap();
        let back: Attestation = serde_json::from_str(&json).unwrap();

        assert_eq!(back, attestation);
        let Some(AttestationPayload::Vex(payload)) = back.payload else {
            unreachable!("payload was set above");
        };
        assert_eq!(payload.invocation.parameters, ["-q", "image", "-q"]);
    }

    #[test]
    fn test_attestation_type_field_name() {
        let json = serde_json::to_value(Attestation::new("sha256:att").unwrap().with_type("vex"))
            .unwrap();
        assert_eq!(json["type"], "vex");
        assert!(json["payload"].is_null());
    }

    #[test]
    fn test_identity_key_fields() {
        let identity = Identity::new("sha256:key", "builder@example.com")
            .unwrap()
            .with_key("MFkw...", "ecdsa", "ecdsa-sha2-nistp256");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["keyType"], "ecdsa");
        assert_eq!(json["keyScheme"], "ecdsa-sha2-nistp256");
        assert!(identity.source_info().is_none());
    }

    #[test]
    fn test_vulnerability_requires_id() {
        assert!(matches!(
            Vulnerability::new(""),
            Err(Error::InvalidIdentity { .. })
        ));
    }
}
