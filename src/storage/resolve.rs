//! Materializes fully-populated entities from a [`GraphSnapshot`].
//!
//! Records reference their neighbours by identity; the contract promises
//! callers fully-populated values. The [`Resolver`] walks those references,
//! wrapping artifact/package targets in their [`ArtifactOrPackage`] variant.
//! Resolved artifacts and packages are memoized per call, so shared
//! dependencies are materialized once.
//!
//! Resolution walks `dependsOn` and `contains` with an explicit stack, so
//! graph depth never turns into call-stack depth. Chains longer than the
//! context's [`max_depth`](QueryContext::max_depth) fail instead of producing
//! values too deeply nested to clone, serialize or drop safely.
//!
//! A dependency cycle (through `dependsOn` or `contains`) cannot be fully
//! populated and is reported as [`Error::QueryFailed`], as is a dangling
//! reference left behind by corrupted storage.

use crate::context::QueryContext;
use crate::models::{
    Artifact, ArtifactOrPackage, ArtifactRecord, Attestation, AttestationRecord, Builder,
    BuilderKey, Digest, Identity, IdentityRecord, Metadata, MetadataRecord, NaturalId, NodeRef,
    Package, PackageRecord, Purl, Vulnerability,
};
use crate::storage::snapshot::GraphSnapshot;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// Per-call resolver over one snapshot.
///
/// Memoized values are stored with their height: the number of nodes on the
/// longest `dependsOn`/`contains` chain starting at them.
pub struct Resolver<'a> {
    snapshot: &'a GraphSnapshot,
    ctx: &'a QueryContext,
    operation: &'static str,
    artifacts: HashMap<Digest, (Artifact, usize)>,
    packages: HashMap<Purl, (Package, usize)>,
    in_progress: HashSet<NodeRef>,
}

/// A node whose children are still being resolved.
struct Frame {
    node: NodeRef,
    pending: Vec<NodeRef>,
}

impl<'a> Resolver<'a> {
    /// Creates a resolver for one contract operation.
    #[must_use]
    pub fn new(
        snapshot: &'a GraphSnapshot,
        ctx: &'a QueryContext,
        operation: &'static str,
    ) -> Self {
        Self {
            snapshot,
            ctx,
            operation,
            artifacts: HashMap::new(),
            packages: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Resolves every artifact, in digest order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context stops the call, or
    /// [`Error::QueryFailed`] on a cycle or dangling reference.
    pub fn all_artifacts(mut self) -> Result<Vec<Artifact>> {
        let snapshot = self.snapshot;
        snapshot
            .artifacts
            .keys()
            .map(|digest| self.artifact(digest))
            .collect()
    }

    /// Resolves every package, in purl order.
    ///
    /// # Errors
    ///
    /// As [`Resolver::all_artifacts`].
    pub fn all_packages(mut self) -> Result<Vec<Package>> {
        let snapshot = self.snapshot;
        snapshot
            .packages
            .keys()
            .map(|purl| self.package(purl))
            .collect()
    }

    /// Returns every builder, in key order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context stops the call.
    pub fn all_builders(self) -> Result<Vec<Builder>> {
        self.ctx.check(self.operation)?;
        Ok(self.snapshot.builders.values().cloned().collect())
    }

    /// Resolves every attestation, in digest order.
    ///
    /// # Errors
    ///
    /// As [`Resolver::all_artifacts`].
    pub fn all_attestations(mut self) -> Result<Vec<Attestation>> {
        let snapshot = self.snapshot;
        snapshot
            .attestations
            .values()
            .map(|record| self.attestation_from(record))
            .collect()
    }

    /// Resolves every metadata node, in key order.
    ///
    /// # Errors
    ///
    /// As [`Resolver::all_artifacts`].
    pub fn all_metadata(mut self) -> Result<Vec<Metadata>> {
        let snapshot = self.snapshot;
        snapshot
            .metadata
            .values()
            .map(|record| self.metadata_from(record))
            .collect()
    }

    /// Resolves every identity, in digest order.
    ///
    /// # Errors
    ///
    /// As [`Resolver::all_artifacts`].
    pub fn all_identities(mut self) -> Result<Vec<Identity>> {
        let snapshot = self.snapshot;
        snapshot
            .identities
            .values()
            .map(|record| self.identity_from(record))
            .collect()
    }

    /// Returns every vulnerability, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context stops the call.
    pub fn all_vulnerabilities(self) -> Result<Vec<Vulnerability>> {
        self.ctx.check(self.operation)?;
        Ok(self.snapshot.vulnerabilities.values().cloned().collect())
    }

    fn node(&mut self, node: &NodeRef) -> Result<ArtifactOrPackage> {
        if !self.is_resolved(node) {
            self.materialize(node.clone())?;
        }
        self.resolved(node).map(|(value, _)| value)
    }

    fn artifact(&mut self, digest: &Digest) -> Result<Artifact> {
        if !self.artifacts.contains_key(digest) {
            self.materialize(NodeRef::Artifact {
                digest: digest.clone(),
            })?;
        }
        self.artifacts
            .get(digest)
            .map(|(artifact, _)| artifact.clone())
            .ok_or_else(|| self.missing(&format!("Artifact({digest})")))
    }

    fn package(&mut self, purl: &Purl) -> Result<Package> {
        if !self.packages.contains_key(purl) {
            self.materialize(NodeRef::Package { purl: purl.clone() })?;
        }
        self.packages
            .get(purl)
            .map(|(package, _)| package.clone())
            .ok_or_else(|| self.missing(&format!("Package({purl})")))
    }

    /// Resolves `root` and every unresolved node below it, children first.
    fn materialize(&mut self, root: NodeRef) -> Result<()> {
        let mut stack = vec![self.open(root)?];
        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.pending.pop() {
                if self.is_resolved(&child) {
                    continue;
                }
                if self.in_progress.contains(&child) {
                    return Err(self.failed(format!("dependency cycle through {child}")));
                }
                if stack.len() >= self.ctx.max_depth() {
                    return Err(self.too_deep(&child));
                }
                let frame = self.open(child)?;
                stack.push(frame);
            } else if let Some(frame) = stack.pop() {
                self.close(frame)?;
            }
        }
        Ok(())
    }

    fn open(&mut self, node: NodeRef) -> Result<Frame> {
        self.ctx.check(self.operation)?;
        let snapshot = self.snapshot;
        let mut pending: Vec<NodeRef> = match &node {
            NodeRef::Artifact { digest } => snapshot
                .artifacts
                .get(digest)
                .ok_or_else(|| self.dangling(&node))?
                .depends_on
                .iter()
                .cloned()
                .collect(),
            NodeRef::Package { purl } => {
                let record = snapshot
                    .packages
                    .get(purl)
                    .ok_or_else(|| self.dangling(&node))?;
                record
                    .contains
                    .iter()
                    .map(|digest| NodeRef::Artifact {
                        digest: digest.clone(),
                    })
                    .chain(record.depends_on.iter().cloned())
                    .collect()
            },
        };
        // Popped from the back; keep declaration order.
        pending.reverse();
        self.in_progress.insert(node.clone());
        Ok(Frame { node, pending })
    }

    /// Builds a node whose children are all resolved and memoizes it.
    fn close(&mut self, frame: Frame) -> Result<()> {
        self.in_progress.remove(&frame.node);
        let snapshot = self.snapshot;
        match frame.node {
            NodeRef::Artifact { digest } => {
                let record = snapshot
                    .artifacts
                    .get(&digest)
                    .ok_or_else(|| self.dangling(&NodeRef::Artifact { digest: digest.clone() }))?;
                let (artifact, height) = self.artifact_from(record)?;
                self.artifacts.insert(digest, (artifact, height));
            },
            NodeRef::Package { purl } => {
                let record = snapshot
                    .packages
                    .get(&purl)
                    .ok_or_else(|| self.dangling(&NodeRef::Package { purl: purl.clone() }))?;
                let (package, height) = self.package_from(record)?;
                self.packages.insert(purl, (package, height));
            },
        }
        Ok(())
    }

    fn is_resolved(&self, node: &NodeRef) -> bool {
        match node {
            NodeRef::Artifact { digest } => self.artifacts.contains_key(digest),
            NodeRef::Package { purl } => self.packages.contains_key(purl),
        }
    }

    /// Returns a memoized node and its height.
    fn resolved(&self, node: &NodeRef) -> Result<(ArtifactOrPackage, usize)> {
        let found = match node {
            NodeRef::Artifact { digest } => self
                .artifacts
                .get(digest)
                .map(|(artifact, height)| (ArtifactOrPackage::Artifact(artifact.clone()), *height)),
            NodeRef::Package { purl } => self
                .packages
                .get(purl)
                .map(|(package, height)| (ArtifactOrPackage::Package(package.clone()), *height)),
        };
        found.ok_or_else(|| self.dangling(node))
    }

    /// Collects resolved children and the height of the node above them.
    fn children<'n>(
        &self,
        nodes: impl Iterator<Item = &'n NodeRef>,
    ) -> Result<(Vec<ArtifactOrPackage>, usize)> {
        let mut values = Vec::new();
        let mut height = 1;
        for node in nodes {
            let (value, below) = self.resolved(node)?;
            height = height.max(below + 1);
            values.push(value);
        }
        Ok((values, height))
    }

    fn bounded(&self, node: &NodeRef, height: usize) -> Result<usize> {
        if height > self.ctx.max_depth() {
            return Err(self.too_deep(node));
        }
        Ok(height)
    }

    fn artifact_from(&self, record: &ArtifactRecord) -> Result<(Artifact, usize)> {
        let built_by = record
            .built_by
            .iter()
            .map(|key| self.builder(key))
            .collect::<Result<Vec<_>>>()?;
        let (depends_on, height) = self.children(record.depends_on.iter())?;
        let height = self.bounded(
            &NodeRef::Artifact {
                digest: record.digest.clone(),
            },
            height,
        )?;

        let artifact = Artifact {
            digest: record.digest.clone(),
            name: record.name.clone(),
            tags: record.tags.clone(),
            node_info: record.node_info.clone(),
            built_by,
            depends_on,
        };
        Ok((artifact, height))
    }

    fn package_from(&self, record: &PackageRecord) -> Result<(Package, usize)> {
        let mut contains = Vec::with_capacity(record.contains.len());
        let mut contains_height = 1;
        for digest in &record.contains {
            let (artifact, below) = self.artifacts.get(digest).ok_or_else(|| {
                self.dangling(&NodeRef::Artifact {
                    digest: digest.clone(),
                })
            })?;
            contains_height = contains_height.max(below + 1);
            contains.push(artifact.clone());
        }
        let (depends_on, depends_height) = self.children(record.depends_on.iter())?;
        let height = self.bounded(
            &NodeRef::Package {
                purl: record.purl.clone(),
            },
            contains_height.max(depends_height),
        )?;

        let package = Package {
            purl: record.purl.clone(),
            name: record.name.clone(),
            version: record.version.clone(),
            digests: record.digests.clone(),
            cpes: record.cpes.clone(),
            tags: record.tags.clone(),
            node_info: record.node_info.clone(),
            contains,
            depends_on,
        };
        Ok((package, height))
    }

    fn attestation(&mut self, digest: &Digest) -> Result<Attestation> {
        let snapshot = self.snapshot;
        let record = snapshot
            .attestations
            .get(digest)
            .ok_or_else(|| self.missing(&format!("Attestation({digest})")))?;
        self.attestation_from(record)
    }

    fn attestation_from(&mut self, record: &AttestationRecord) -> Result<Attestation> {
        self.ctx.check(self.operation)?;
        let attested_objects = record
            .attested_objects
            .iter()
            .map(|node| self.node(node))
            .collect::<Result<Vec<_>>>()?;
        let vulnerabilities = record
            .vulnerabilities
            .iter()
            .map(|id| self.vulnerability(id))
            .collect::<Result<Vec<_>>>()?;

        Ok(Attestation {
            digest: record.digest.clone(),
            file_path: record.file_path.clone(),
            attestation_type: record.attestation_type.clone(),
            node_info: record.node_info.clone(),
            attested_objects,
            vulnerabilities,
            payload: record.payload.clone(),
        })
    }

    fn metadata_from(&mut self, record: &MetadataRecord) -> Result<Metadata> {
        self.ctx.check(self.operation)?;
        let attached_to = record
            .attached_to
            .iter()
            .map(|node| self.node(node))
            .collect::<Result<Vec<_>>>()?;

        Ok(Metadata {
            metadata_type: record.metadata_type.clone(),
            id: record.id.clone(),
            node_info: record.node_info.clone(),
            attached_to,
            payload: record.payload.clone(),
        })
    }

    fn identity_from(&mut self, record: &IdentityRecord) -> Result<Identity> {
        self.ctx.check(self.operation)?;
        let attestations = record
            .attestations
            .iter()
            .map(|digest| self.attestation(digest))
            .collect::<Result<Vec<_>>>()?;

        Ok(Identity {
            digest: record.digest.clone(),
            id: record.id.clone(),
            key: record.key.clone(),
            key_type: record.key_type.clone(),
            key_scheme: record.key_scheme.clone(),
            node_info: record.node_info.clone(),
            attestations,
        })
    }

    fn builder(&self, key: &BuilderKey) -> Result<Builder> {
        self.snapshot
            .builders
            .get(key)
            .cloned()
            .ok_or_else(|| self.missing(&format!("Builder({key})")))
    }

    fn vulnerability(&self, id: &NaturalId) -> Result<Vulnerability> {
        self.snapshot
            .vulnerabilities
            .get(id)
            .cloned()
            .ok_or_else(|| self.missing(&format!("Vulnerability({id})")))
    }

    fn failed(&self, cause: String) -> Error {
        Error::QueryFailed {
            operation: self.operation.to_string(),
            cause,
        }
    }

    fn too_deep(&self, node: &NodeRef) -> Error {
        self.failed(format!(
            "dependency chain through {node} is deeper than {} nodes",
            self.ctx.max_depth()
        ))
    }

    fn dangling(&self, node: &NodeRef) -> Error {
        self.missing(&node.to_string())
    }

    fn missing(&self, what: &str) -> Error {
        self.failed(format!("dangling reference to {what}"))
    }
}
