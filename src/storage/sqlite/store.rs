//! Row codec between the `SQLite` tables and a [`GraphSnapshot`].

use super::connection::classify_sqlite_error;
use super::schema::{edge, kind};
use crate::context::QueryContext;
use crate::models::{
    ArtifactRecord, AttestationPayload, AttestationRecord, Builder, BuilderKey, Digest,
    IdentityRecord, IngestBatch, MetadataPayload, MetadataRecord, NaturalId, NodeInfo, NodeRef,
    PackageRecord, Purl, TaggedUnion, Vulnerability, resolve_str,
};
use crate::storage::snapshot::{GraphSnapshot, Reference};
use crate::{Error, Result};
use rusqlite::{Connection, Params, Row, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeSet, HashMap};

/// Tables a read needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Artifacts,
    Packages,
    Builders,
    Attestations,
    Metadata,
    Identities,
    Vulnerabilities,
}

impl Table {
    /// Tables reachable from artifacts and packages.
    pub const NODES: &'static [Self] = &[Self::Builders, Self::Artifacts, Self::Packages];
}

/// One outgoing edge row, keyed by the source node's identity.
struct EdgeRow {
    edge: String,
    to_kind: String,
    to_key: String,
    to_key2: String,
}

/// Row identity: both key columns for composite keys, `(key, "")` otherwise.
type RowKey = (String, String);

type EdgeMap = HashMap<RowKey, Vec<EdgeRow>>;

/// Rows a load covers.
enum Scope {
    /// Every row of the table.
    All,
    /// Only the rows with these identities; absent ones are skipped.
    Keys(BTreeSet<RowKey>),
}

/// Query shape of one node table.
struct TableSql {
    select: &'static str,
    key_filter: &'static str,
    key_columns: usize,
    edge_kind: Option<&'static str>,
}

const BUILDERS: TableSql = TableSql {
    select: "SELECT builder_type, id, source_info, collector_info FROM builders",
    key_filter: "builder_type = ?1 AND id = ?2",
    key_columns: 2,
    edge_kind: None,
};

const VULNERABILITIES: TableSql = TableSql {
    select: "SELECT id, source_info, collector_info FROM vulnerabilities",
    key_filter: "id = ?1",
    key_columns: 1,
    edge_kind: None,
};

const ARTIFACTS: TableSql = TableSql {
    select: "SELECT digest, name, tags, source_info, collector_info FROM artifacts",
    key_filter: "digest = ?1",
    key_columns: 1,
    edge_kind: Some(kind::ARTIFACT),
};

const PACKAGES: TableSql = TableSql {
    select: "SELECT purl, name, version, digests, cpes, tags, source_info, collector_info
             FROM packages",
    key_filter: "purl = ?1",
    key_columns: 1,
    edge_kind: Some(kind::PACKAGE),
};

const ATTESTATIONS: TableSql = TableSql {
    select: "SELECT digest, file_path, attestation_type, source_info, collector_info, payload
             FROM attestations",
    key_filter: "digest = ?1",
    key_columns: 1,
    edge_kind: Some(kind::ATTESTATION),
};

const METADATA: TableSql = TableSql {
    select: "SELECT metadata_type, id, source_info, collector_info, payload FROM metadata",
    key_filter: "metadata_type = ?1 AND id = ?2",
    key_columns: 2,
    edge_kind: Some(kind::METADATA),
};

const IDENTITIES: TableSql = TableSql {
    select: "SELECT digest, id, key, key_type, key_scheme, source_info, collector_info
             FROM identities",
    key_filter: "digest = ?1",
    key_columns: 1,
    edge_kind: Some(kind::IDENTITY),
};

/// Loads the requested tables into a snapshot.
///
/// Callers run this inside a transaction so every table is read from the
/// same database state.
pub fn load_snapshot(
    conn: &Connection,
    ctx: &QueryContext,
    operation: &'static str,
    tables: &[Table],
) -> Result<GraphSnapshot> {
    let loader = Loader {
        conn,
        ctx,
        operation,
    };
    let mut snapshot = GraphSnapshot::new();
    for table in tables {
        ctx.check(operation)?;
        match table {
            Table::Artifacts => loader.artifacts(&mut snapshot, &Scope::All)?,
            Table::Packages => loader.packages(&mut snapshot, &Scope::All)?,
            Table::Builders => loader.builders(&mut snapshot, &Scope::All)?,
            Table::Attestations => loader.attestations(&mut snapshot, &Scope::All)?,
            Table::Metadata => loader.metadata(&mut snapshot, &Scope::All)?,
            Table::Identities => loader.identities(&mut snapshot, &Scope::All)?,
            Table::Vulnerabilities => loader.vulnerabilities(&mut snapshot, &Scope::All)?,
        }
    }
    Ok(snapshot)
}

/// Loads the stored rows whose identities appear in `batch`.
///
/// The result holds only records the batch is about to merge into, so the
/// cost of an ingest follows the batch size rather than the database size.
pub fn load_batch_records(
    conn: &Connection,
    ctx: &QueryContext,
    batch: &IngestBatch,
) -> Result<GraphSnapshot> {
    fn single<'a>(keys: impl Iterator<Item = &'a str>) -> Scope {
        Scope::Keys(keys.map(|key| (key.to_string(), String::new())).collect())
    }
    fn pairs<'a>(keys: impl Iterator<Item = (&'a str, &'a str)>) -> Scope {
        Scope::Keys(keys.map(|(a, b)| (a.to_string(), b.to_string())).collect())
    }

    let loader = Loader {
        conn,
        ctx,
        operation: INGEST,
    };
    let mut snapshot = GraphSnapshot::new();
    loader.builders(
        &mut snapshot,
        &pairs(batch.builders.iter().map(|b| (b.builder_type.as_str(), b.id.as_str()))),
    )?;
    loader.vulnerabilities(
        &mut snapshot,
        &single(batch.vulnerabilities.iter().map(|v| v.id.as_str())),
    )?;
    loader.artifacts(&mut snapshot, &single(batch.artifacts.iter().map(|r| r.digest.as_str())))?;
    loader.packages(&mut snapshot, &single(batch.packages.iter().map(|r| r.purl.as_str())))?;
    loader.attestations(
        &mut snapshot,
        &single(batch.attestations.iter().map(|r| r.digest.as_str())),
    )?;
    loader.metadata(
        &mut snapshot,
        &pairs(batch.metadata.iter().map(|r| (r.metadata_type.as_str(), r.id.as_str()))),
    )?;
    loader.identities(
        &mut snapshot,
        &single(batch.identities.iter().map(|r| r.digest.as_str())),
    )?;
    Ok(snapshot)
}

/// Reports whether the target of `reference` is stored.
pub fn reference_exists(conn: &Connection, reference: Reference<'_>) -> Result<bool> {
    let (query, key, key2) = match reference {
        Reference::Node(NodeRef::Artifact { digest }) | Reference::Artifact(digest) => (
            "SELECT EXISTS(SELECT 1 FROM artifacts WHERE digest = ?1)",
            digest.as_str(),
            None,
        ),
        Reference::Node(NodeRef::Package { purl }) => (
            "SELECT EXISTS(SELECT 1 FROM packages WHERE purl = ?1)",
            purl.as_str(),
            None,
        ),
        Reference::Builder(key) => (
            "SELECT EXISTS(SELECT 1 FROM builders WHERE builder_type = ?1 AND id = ?2)",
            key.builder_type.as_str(),
            Some(key.id.as_str()),
        ),
        Reference::Vulnerability(id) => (
            "SELECT EXISTS(SELECT 1 FROM vulnerabilities WHERE id = ?1)",
            id.as_str(),
            None,
        ),
        Reference::Attestation(digest) => (
            "SELECT EXISTS(SELECT 1 FROM attestations WHERE digest = ?1)",
            digest.as_str(),
            None,
        ),
    };
    let mut stmt = conn
        .prepare_cached(query)
        .map_err(|e| classify_sqlite_error(INGEST, &e))?;
    let exists = match key2 {
        Some(key2) => stmt.query_row(params![key, key2], |row| row.get(0)),
        None => stmt.query_row(params![key], |row| row.get(0)),
    };
    exists.map_err(|e| classify_sqlite_error(INGEST, &e))
}

struct Loader<'a> {
    conn: &'a Connection,
    ctx: &'a QueryContext,
    operation: &'static str,
}

impl Loader<'_> {
    fn sql(&self, err: &rusqlite::Error) -> Error {
        classify_sqlite_error(self.operation, err)
    }

    /// Runs `query` and hands every row to `visit`, checking the context
    /// between rows.
    fn each_row(
        &self,
        query: &str,
        params: impl Params,
        mut visit: impl FnMut(&Row<'_>) -> Result<()>,
    ) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(query).map_err(|e| self.sql(&e))?;
        let mut rows = stmt.query(params).map_err(|e| self.sql(&e))?;
        while let Some(row) = rows.next().map_err(|e| self.sql(&e))? {
            self.ctx.check(self.operation)?;
            visit(row)?;
        }
        Ok(())
    }

    /// Visits the rows of `table` in `scope` together with their outgoing
    /// edges.
    fn rows(
        &self,
        table: &TableSql,
        scope: &Scope,
        mut visit: impl FnMut(&Row<'_>, Vec<EdgeRow>) -> Result<()>,
    ) -> Result<()> {
        match scope {
            Scope::All => {
                let mut edges = match table.edge_kind {
                    Some(from_kind) => self.edges(from_kind)?,
                    None => EdgeMap::new(),
                };
                self.each_row(table.select, [], |row| {
                    let key = (
                        self.text(row, 0)?,
                        if table.key_columns == 2 {
                            self.text(row, 1)?
                        } else {
                            String::new()
                        },
                    );
                    visit(row, edges.remove(&key).unwrap_or_default())
                })
            },
            Scope::Keys(keys) => {
                let query = format!("{} WHERE {}", table.select, table.key_filter);
                for key in keys {
                    let values = [key.0.as_str(), key.1.as_str()];
                    let bound = params_from_iter(values.iter().take(table.key_columns));
                    self.each_row(&query, bound, |row| {
                        let edges = match table.edge_kind {
                            Some(from_kind) => self.edges_of(from_kind, key)?,
                            None => Vec::new(),
                        };
                        visit(row, edges)
                    })?;
                }
                Ok(())
            },
        }
    }

    fn edge_row(&self, row: &Row<'_>, first: usize) -> Result<EdgeRow> {
        Ok(EdgeRow {
            edge: self.text(row, first)?,
            to_kind: self.text(row, first + 1)?,
            to_key: self.text(row, first + 2)?,
            to_key2: self.text(row, first + 3)?,
        })
    }

    fn edges(&self, from_kind: &str) -> Result<EdgeMap> {
        let mut map = EdgeMap::new();
        self.each_row(
            "SELECT from_key, from_key2, edge, to_kind, to_key, to_key2
             FROM edges WHERE from_kind = ?1",
            [from_kind],
            |row| {
                let from = (self.text(row, 0)?, self.text(row, 1)?);
                map.entry(from).or_default().push(self.edge_row(row, 2)?);
                Ok(())
            },
        )?;
        Ok(map)
    }

    fn edges_of(&self, from_kind: &str, key: &RowKey) -> Result<Vec<EdgeRow>> {
        let mut edges = Vec::new();
        self.each_row(
            "SELECT edge, to_kind, to_key, to_key2
             FROM edges WHERE from_kind = ?1 AND from_key = ?2 AND from_key2 = ?3",
            params![from_kind, key.0, key.1],
            |row| {
                edges.push(self.edge_row(row, 0)?);
                Ok(())
            },
        )?;
        Ok(edges)
    }

    fn text(&self, row: &Row<'_>, idx: usize) -> Result<String> {
        row.get(idx).map_err(|e| self.sql(&e))
    }

    fn opt_text(&self, row: &Row<'_>, idx: usize) -> Result<Option<String>> {
        row.get(idx).map_err(|e| self.sql(&e))
    }

    fn node_info(&self, row: &Row<'_>, idx: usize) -> Result<NodeInfo> {
        Ok(NodeInfo {
            source_info: self.opt_text(row, idx)?,
            collector_info: self.opt_text(row, idx + 1)?,
        })
    }

    fn json_set<T: DeserializeOwned + Ord>(
        &self,
        row: &Row<'_>,
        idx: usize,
        column: &str,
    ) -> Result<BTreeSet<T>> {
        let raw = self.text(row, idx)?;
        serde_json::from_str(&raw).map_err(|e| Error::QueryFailed {
            operation: self.operation.to_string(),
            cause: format!("invalid {column} column: {e}"),
        })
    }

    fn payload<U: TaggedUnion>(&self, row: &Row<'_>, idx: usize) -> Result<Option<U>> {
        self.opt_text(row, idx)?
            .map(|json| resolve_str::<U>(&json).map(|(_, payload)| payload))
            .transpose()
    }

    /// Maps identity validation failures on stored keys to query failures.
    fn stored<T>(&self, value: Result<T>) -> Result<T> {
        value.map_err(|e| match e {
            Error::InvalidIdentity { entity, value, reason } => Error::QueryFailed {
                operation: self.operation.to_string(),
                cause: format!("stored {entity} '{value}' is invalid: {reason}"),
            },
            other => other,
        })
    }

    fn node_ref(&self, edge: &EdgeRow) -> Result<NodeRef> {
        let node = NodeRef::from_parts(&edge.to_kind, &edge.to_key);
        self.stored(node)
    }

    fn unexpected(&self, from_kind: &str, edge: &EdgeRow) -> Error {
        Error::QueryFailed {
            operation: self.operation.to_string(),
            cause: format!(
                "unexpected {from_kind} edge '{}' to {}({})",
                edge.edge, edge.to_kind, edge.to_key
            ),
        }
    }

    fn builders(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&BUILDERS, scope, |row, _| {
            let key = self.stored(BuilderKey::new(self.text(row, 0)?, self.text(row, 1)?))?;
            let builder = Builder::from_key(key.clone()).with_node_info(self.node_info(row, 2)?);
            snapshot.builders.insert(key, builder);
            Ok(())
        })
    }

    fn vulnerabilities(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&VULNERABILITIES, scope, |row, _| {
            let id = self.stored(NaturalId::new(self.text(row, 0)?))?;
            let vulnerability = Vulnerability {
                id: id.clone(),
                node_info: self.node_info(row, 1)?,
            };
            snapshot.vulnerabilities.insert(id, vulnerability);
            Ok(())
        })
    }

    fn artifacts(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&ARTIFACTS, scope, |row, edges| {
            let mut record = ArtifactRecord {
                digest: self.stored(Digest::new(self.text(row, 0)?))?,
                name: self.opt_text(row, 1)?,
                tags: self.json_set(row, 2, "tags")?,
                node_info: self.node_info(row, 3)?,
                built_by: BTreeSet::new(),
                depends_on: BTreeSet::new(),
            };
            for edge in edges {
                match (edge.edge.as_str(), edge.to_kind.as_str()) {
                    (edge::BUILT_BY, kind::BUILDER) => {
                        let builder = BuilderKey::new(edge.to_key.as_str(), edge.to_key2.as_str());
                        record.built_by.insert(self.stored(builder)?);
                    },
                    (edge::DEPENDS_ON, _) => {
                        record.depends_on.insert(self.node_ref(&edge)?);
                    },
                    _ => return Err(self.unexpected(kind::ARTIFACT, &edge)),
                }
            }
            snapshot.artifacts.insert(record.digest.clone(), record);
            Ok(())
        })
    }

    fn packages(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&PACKAGES, scope, |row, edges| {
            let mut record = PackageRecord {
                purl: self.stored(Purl::new(self.text(row, 0)?))?,
                name: self.opt_text(row, 1)?,
                version: self.opt_text(row, 2)?,
                digests: self.json_set(row, 3, "digests")?,
                cpes: self.json_set(row, 4, "cpes")?,
                tags: self.json_set(row, 5, "tags")?,
                node_info: self.node_info(row, 6)?,
                contains: BTreeSet::new(),
                depends_on: BTreeSet::new(),
            };
            for edge in edges {
                match (edge.edge.as_str(), edge.to_kind.as_str()) {
                    (edge::CONTAINS, kind::ARTIFACT) => {
                        record
                            .contains
                            .insert(self.stored(Digest::new(edge.to_key.as_str()))?);
                    },
                    (edge::DEPENDS_ON, _) => {
                        record.depends_on.insert(self.node_ref(&edge)?);
                    },
                    _ => return Err(self.unexpected(kind::PACKAGE, &edge)),
                }
            }
            snapshot.packages.insert(record.purl.clone(), record);
            Ok(())
        })
    }

    fn attestations(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&ATTESTATIONS, scope, |row, edges| {
            let mut record = AttestationRecord {
                digest: self.stored(Digest::new(self.text(row, 0)?))?,
                file_path: self.opt_text(row, 1)?,
                attestation_type: self.opt_text(row, 2)?,
                node_info: self.node_info(row, 3)?,
                attested_objects: BTreeSet::new(),
                vulnerabilities: BTreeSet::new(),
                payload: self.payload::<AttestationPayload>(row, 5)?,
            };
            for edge in edges {
                match (edge.edge.as_str(), edge.to_kind.as_str()) {
                    (edge::ATTESTED_OBJECTS, _) => {
                        record.attested_objects.insert(self.node_ref(&edge)?);
                    },
                    (edge::VULNERABILITIES, kind::VULNERABILITY) => {
                        record
                            .vulnerabilities
                            .insert(self.stored(NaturalId::new(edge.to_key.as_str()))?);
                    },
                    _ => return Err(self.unexpected(kind::ATTESTATION, &edge)),
                }
            }
            snapshot.attestations.insert(record.digest.clone(), record);
            Ok(())
        })
    }

    fn metadata(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&METADATA, scope, |row, edges| {
            let mut record = MetadataRecord {
                metadata_type: self.stored(NaturalId::new(self.text(row, 0)?))?,
                id: self.stored(NaturalId::new(self.text(row, 1)?))?,
                node_info: self.node_info(row, 2)?,
                attached_to: BTreeSet::new(),
                payload: self.payload::<MetadataPayload>(row, 4)?,
            };
            for edge in edges {
                match edge.edge.as_str() {
                    edge::ATTACHED_TO => {
                        record.attached_to.insert(self.node_ref(&edge)?);
                    },
                    _ => return Err(self.unexpected(kind::METADATA, &edge)),
                }
            }
            snapshot.metadata.insert(record.key(), record);
            Ok(())
        })
    }

    fn identities(&self, snapshot: &mut GraphSnapshot, scope: &Scope) -> Result<()> {
        self.rows(&IDENTITIES, scope, |row, edges| {
            let mut record = IdentityRecord {
                digest: self.stored(Digest::new(self.text(row, 0)?))?,
                id: self.text(row, 1)?,
                key: self.opt_text(row, 2)?,
                key_type: self.opt_text(row, 3)?,
                key_scheme: self.opt_text(row, 4)?,
                node_info: self.node_info(row, 5)?,
                attestations: BTreeSet::new(),
            };
            for edge in edges {
                match (edge.edge.as_str(), edge.to_kind.as_str()) {
                    (edge::ATTESTATIONS, kind::ATTESTATION) => {
                        record
                            .attestations
                            .insert(self.stored(Digest::new(edge.to_key.as_str()))?);
                    },
                    _ => return Err(self.unexpected(kind::IDENTITY, &edge)),
                }
            }
            snapshot.identities.insert(record.digest.clone(), record);
            Ok(())
        })
    }
}

/// Writes the merged state of every node named in `batch` back to the
/// database.
///
/// `merged` must already contain the batch; rows are replaced whole and
/// edges inserted idempotently.
pub fn write_merged(conn: &Connection, merged: &GraphSnapshot, batch: &IngestBatch) -> Result<()> {
    let writer = Writer { conn };

    for builder in &batch.builders {
        if let Some(stored) = merged.builders.get(&builder.key()) {
            writer.builder(stored)?;
        }
    }
    for vulnerability in &batch.vulnerabilities {
        if let Some(stored) = merged.vulnerabilities.get(&vulnerability.id) {
            writer.vulnerability(stored)?;
        }
    }
    for record in &batch.artifacts {
        if let Some(stored) = merged.artifacts.get(&record.digest) {
            writer.artifact(stored)?;
        }
    }
    for record in &batch.packages {
        if let Some(stored) = merged.packages.get(&record.purl) {
            writer.package(stored)?;
        }
    }
    for record in &batch.attestations {
        if let Some(stored) = merged.attestations.get(&record.digest) {
            writer.attestation(stored)?;
        }
    }
    for record in &batch.metadata {
        if let Some(stored) = merged.metadata.get(&record.key()) {
            writer.metadata(stored)?;
        }
    }
    for record in &batch.identities {
        if let Some(stored) = merged.identities.get(&record.digest) {
            writer.identity(stored)?;
        }
    }
    Ok(())
}

const INGEST: &str = "ingest";

struct Writer<'a> {
    conn: &'a Connection,
}

impl Writer<'_> {
    fn sql(err: &rusqlite::Error) -> Error {
        classify_sqlite_error(INGEST, err)
    }

    fn json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| Error::QueryFailed {
            operation: INGEST.to_string(),
            cause: e.to_string(),
        })
    }

    fn edge(&self, from: (&str, &str, &str), edge: &str, to: (&str, &str, &str)) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO edges
                 (from_kind, from_key, from_key2, edge, to_kind, to_key, to_key2)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![from.0, from.1, from.2, edge, to.0, to.1, to.2],
            )
            .map_err(|e| Self::sql(&e))?;
        Ok(())
    }

    fn node_edge(&self, from: (&str, &str, &str), edge: &str, node: &NodeRef) -> Result<()> {
        self.edge(from, edge, (node.type_name(), node.key(), ""))
    }

    fn builder(&self, builder: &Builder) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO builders (builder_type, id, source_info, collector_info)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    builder.builder_type.as_str(),
                    builder.id.as_str(),
                    builder.node_info.source_info,
                    builder.node_info.collector_info,
                ],
            )
            .map_err(|e| Self::sql(&e))?;
        Ok(())
    }

    fn vulnerability(&self, vulnerability: &Vulnerability) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO vulnerabilities (id, source_info, collector_info)
                 VALUES (?1, ?2, ?3)",
                params![
                    vulnerability.id.as_str(),
                    vulnerability.node_info.source_info,
                    vulnerability.node_info.collector_info,
                ],
            )
            .map_err(|e| Self::sql(&e))?;
        Ok(())
    }

    fn artifact(&self, record: &ArtifactRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO artifacts (digest, name, tags, source_info, collector_info)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.digest.as_str(),
                    record.name,
                    Self::json(&record.tags)?,
                    record.node_info.source_info,
                    record.node_info.collector_info,
                ],
            )
            .map_err(|e| Self::sql(&e))?;

        let from = (kind::ARTIFACT, record.digest.as_str(), "");
        for key in &record.built_by {
            let to = (kind::BUILDER, key.builder_type.as_str(), key.id.as_str());
            self.edge(from, edge::BUILT_BY, to)?;
        }
        for node in &record.depends_on {
            self.node_edge(from, edge::DEPENDS_ON, node)?;
        }
        Ok(())
    }

    fn package(&self, record: &PackageRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO packages
                 (purl, name, version, digests, cpes, tags, source_info, collector_info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.purl.as_str(),
                    record.name,
                    record.version,
                    Self::json(&record.digests)?,
                    Self::json(&record.cpes)?,
                    Self::json(&record.tags)?,
                    record.node_info.source_info,
                    record.node_info.collector_info,
                ],
            )
            .map_err(|e| Self::sql(&e))?;

        let from = (kind::PACKAGE, record.purl.as_str(), "");
        for digest in &record.contains {
            self.edge(from, edge::CONTAINS, (kind::ARTIFACT, digest.as_str(), ""))?;
        }
        for node in &record.depends_on {
            self.node_edge(from, edge::DEPENDS_ON, node)?;
        }
        Ok(())
    }

    fn attestation(&self, record: &AttestationRecord) -> Result<()> {
        let payload = record.payload.as_ref().map(Self::json).transpose()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO attestations
                 (digest, file_path, attestation_type, source_info, collector_info, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.digest.as_str(),
                    record.file_path,
                    record.attestation_type,
                    record.node_info.source_info,
                    record.node_info.collector_info,
                    payload,
                ],
            )
            .map_err(|e| Self::sql(&e))?;

        let from = (kind::ATTESTATION, record.digest.as_str(), "");
        for node in &record.attested_objects {
            self.node_edge(from, edge::ATTESTED_OBJECTS, node)?;
        }
        for id in &record.vulnerabilities {
            self.edge(from, edge::VULNERABILITIES, (kind::VULNERABILITY, id.as_str(), ""))?;
        }
        Ok(())
    }

    fn metadata(&self, record: &MetadataRecord) -> Result<()> {
        let payload = record.payload.as_ref().map(Self::json).transpose()?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata
                 (metadata_type, id, source_info, collector_info, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.metadata_type.as_str(),
                    record.id.as_str(),
                    record.node_info.source_info,
                    record.node_info.collector_info,
                    payload,
                ],
            )
            .map_err(|e| Self::sql(&e))?;

        let from = (kind::METADATA, record.metadata_type.as_str(), record.id.as_str());
        for node in &record.attached_to {
            self.node_edge(from, edge::ATTACHED_TO, node)?;
        }
        Ok(())
    }

    fn identity(&self, record: &IdentityRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO identities
                 (digest, id, key, key_type, key_scheme, source_info, collector_info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.digest.as_str(),
                    record.id,
                    record.key,
                    record.key_type,
                    record.key_scheme,
                    record.node_info.source_info,
                    record.node_info.collector_info,
                ],
            )
            .map_err(|e| Self::sql(&e))?;

        let from = (kind::IDENTITY, record.digest.as_str(), "");
        for digest in &record.attestations {
            self.edge(from, edge::ATTESTATIONS, (kind::ATTESTATION, digest.as_str(), ""))?;
        }
        Ok(())
    }
}
