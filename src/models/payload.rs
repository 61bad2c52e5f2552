//! Payload value types owned by attestations and metadata nodes.
//!
//! Payloads have no identity of their own. They live and die with the node
//! that owns them and are exposed through the closed unions
//! [`AttestationPayload`] and [`MetadataPayload`].

use crate::models::NaturalId;
use crate::models::union::TaggedUnion;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// `OpenSSF` Scorecard result attached to a source repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorecardPayload {
    /// Repository the scorecard was computed for.
    pub repo: String,
    /// Commit the scorecard was computed at.
    pub commit: String,
    /// Version of the scorecard tool.
    pub scorecard_version: String,
    /// Commit of the scorecard tool.
    pub scorecard_commit: String,
    /// Aggregate score.
    pub aggregate_score: f64,
}

/// Invocation details of a VEX scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VexInvocation {
    /// Scanner parameters, in invocation order. Duplicates are significant.
    pub parameters: Vec<String>,
    /// Invocation URI.
    pub uri: String,
    /// Event identifier.
    #[serde(rename = "eventID")]
    pub event_id: String,
    /// Producer identifier.
    #[serde(rename = "producerID")]
    pub producer_id: String,
    /// Scan timestamp as reported by the producer.
    #[serde(rename = "scannedOn")]
    pub scanned_on: String,
}

/// Scanner that produced a VEX document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VexScanner {
    /// Scanner URI.
    pub uri: String,
    /// Scanner version.
    pub version: String,
    /// Vulnerability database URI.
    pub db_uri: String,
    /// Vulnerability database version.
    pub db_version: String,
}

/// Vulnerability reported inside a VEX payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VexVulnerability {
    /// Vulnerability id as reported by the scanner.
    pub id: NaturalId,
    /// Alternative ids (GHSA, OSV, ...).
    #[serde(default)]
    pub aliases: BTreeSet<String>,
}

impl VexVulnerability {
    /// Creates a VEX vulnerability entry without aliases.
    #[must_use]
    pub const fn new(id: NaturalId) -> Self {
        Self {
            id,
            aliases: BTreeSet::new(),
        }
    }

    /// Adds aliases.
    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }
}

/// Vulnerability Exploitability eXchange scan result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VexPayload {
    /// How the scan was invoked.
    pub invocation: VexInvocation,
    /// Which scanner ran.
    pub scanner: VexScanner,
    /// Reported vulnerabilities, in report order, unique by id.
    #[serde(default, deserialize_with = "unique_vulnerabilities")]
    pub vulnerabilities: Vec<VexVulnerability>,
}

impl VexPayload {
    /// Creates a payload with no vulnerabilities.
    #[must_use]
    pub const fn new(invocation: VexInvocation, scanner: VexScanner) -> Self {
        Self {
            invocation,
            scanner,
            vulnerabilities: Vec::new(),
        }
    }

    /// Appends a vulnerability, merging aliases if the id is already present.
    #[must_use]
    pub fn with_vulnerability(mut self, vulnerability: VexVulnerability) -> Self {
        push_unique(&mut self.vulnerabilities, vulnerability);
        self
    }
}

fn push_unique(vulnerabilities: &mut Vec<VexVulnerability>, vulnerability: VexVulnerability) {
    if let Some(existing) = vulnerabilities.iter_mut().find(|v| v.id == vulnerability.id) {
        existing.aliases.extend(vulnerability.aliases);
    } else {
        vulnerabilities.push(vulnerability);
    }
}

/// Collapses repeated ids the way [`VexPayload::with_vulnerability`] does.
fn unique_vulnerabilities<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<VexVulnerability>, D::Error>
where
    D: Deserializer<'de>,
{
    let reported = Vec::<VexVulnerability>::deserialize(deserializer)?;
    let mut unique = Vec::with_capacity(reported.len());
    for vulnerability in reported {
        push_unique(&mut unique, vulnerability);
    }
    Ok(unique)
}

/// Discriminant of [`AttestationPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationPayloadKind {
    /// [`VexPayload`].
    Vex,
}

/// Payload carried by an attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum AttestationPayload {
    /// VEX scan result.
    #[serde(rename = "VEXPayload")]
    Vex(VexPayload),
}

impl TaggedUnion for AttestationPayload {
    type Kind = AttestationPayloadKind;

    const UNION: &'static str = "AttestationPayload";
    const VARIANTS: &'static [&'static str] = &["VEXPayload"];

    fn kind(&self) -> Self::Kind {
        match self {
            Self::Vex(_) => AttestationPayloadKind::Vex,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Vex(_) => "VEXPayload",
        }
    }

    fn kind_for(type_name: &str) -> Option<Self::Kind> {
        match type_name {
            "VEXPayload" => Some(AttestationPayloadKind::Vex),
            _ => None,
        }
    }
}

/// Discriminant of [`MetadataPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataPayloadKind {
    /// [`ScorecardPayload`].
    Scorecard,
}

/// Payload carried by a metadata node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum MetadataPayload {
    /// Scorecard result.
    #[serde(rename = "ScorecardPayload")]
    Scorecard(ScorecardPayload),
}

impl TaggedUnion for MetadataPayload {
    type Kind = MetadataPayloadKind;

    const UNION: &'static str = "MetadataPayload";
    const VARIANTS: &'static [&'static str] = &["ScorecardPayload"];

    fn kind(&self) -> Self::Kind {
        match self {
            Self::Scorecard(_) => MetadataPayloadKind::Scorecard,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Scorecard(_) => "ScorecardPayload",
        }
    }

    fn kind_for(type_name: &str) -> Option<Self::Kind> {
        match type_name {
            "ScorecardPayload" => Some(MetadataPayloadKind::Scorecard),
            _ => None,
        }
    }
}
