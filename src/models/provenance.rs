//! Provenance capability shared by every node.
//!
//! Any entity may carry where it came from (`sourceInfo`) and who ingested it
//! (`collectorInfo`). Entities compose a [`NodeInfo`] value and implement
//! [`Provenance`] over it; there is no shared base type.

use serde::{Deserialize, Serialize};

/// Origin and collector information attached to a node.
///
/// Both fields are best-effort and optional. Absence never blocks traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Locator of the document the node was ingested from.
    #[serde(default)]
    pub source_info: Option<String>,
    /// Name or identity of the ingesting collector.
    #[serde(default)]
    pub collector_info: Option<String>,
}

impl NodeInfo {
    /// Creates empty provenance info.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            source_info: None,
            collector_info: None,
        }
    }

    /// Sets the source document locator.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_info = Some(source.into());
        self
    }

    /// Sets the collector identity.
    #[must_use]
    pub fn with_collector(mut self, collector: impl Into<String>) -> Self {
        self.collector_info = Some(collector.into());
        self
    }

    /// Merges newer provenance into this one.
    ///
    /// Present fields of `newer` replace the stored ones; absent fields keep
    /// what is already known.
    pub fn merge(&mut self, newer: &Self) {
        if newer.source_info.is_some() {
            self.source_info.clone_from(&newer.source_info);
        }
        if newer.collector_info.is_some() {
            self.collector_info.clone_from(&newer.collector_info);
        }
    }
}

/// Capability of carrying provenance metadata.
pub trait Provenance {
    /// Returns the node's provenance info.
    fn node_info(&self) -> &NodeInfo;

    /// Returns the source document locator, if known.
    fn source_info(&self) -> Option<&str> {
        self.node_info().source_info.as_deref()
    }

    /// Returns the ingesting collector, if known.
    fn collector_info(&self) -> Option<&str> {
        self.node_info().collector_info.as_deref()
    }
}

/// Implements [`Provenance`] for types with a `node_info: NodeInfo` field.
macro_rules! impl_provenance {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::models::Provenance for $ty {
                fn node_info(&self) -> &$crate::models::NodeInfo {
                    &self.node_info
                }
            }
        )+
    };
}

pub(crate) use impl_provenance;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_known_fields() {
        let mut info = NodeInfo::new()
            .with_source("file:///sbom.json")
            .with_collector("file-collector");
        info.merge(&NodeInfo::new().with_collector("oci-collector"));

        assert_eq!(info.source_info.as_deref(), Some("file:///sbom.json"));
        assert_eq!(info.collector_info.as_deref(), Some("oci-collector"));
    }

    #[test]
    fn test_serializes_camel_case_nulls() {
        let json = serde_json::to_value(NodeInfo::new()).unwrap();
        assert_eq!(json, serde_json::json!({"sourceInfo": null, "collectorInfo": null}));
    }
}
