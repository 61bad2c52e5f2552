//! Table layout of the `SQLite` backend.
//!
//! One table per node type holds scalar attributes; set-valued attributes
//! and payloads are JSON text columns. Every edge lives in `edges`, keyed by
//! the node kind and identity on both ends. Composite identities
//! (`Builder`, `Metadata`) use both key columns; the others leave `*_key2`
//! empty.

/// Schema DDL, idempotent.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS artifacts (
    digest TEXT PRIMARY KEY,
    name TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    source_info TEXT,
    collector_info TEXT
);

CREATE TABLE IF NOT EXISTS packages (
    purl TEXT PRIMARY KEY,
    name TEXT,
    version TEXT,
    digests TEXT NOT NULL DEFAULT '[]',
    cpes TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    source_info TEXT,
    collector_info TEXT
);

CREATE TABLE IF NOT EXISTS builders (
    builder_type TEXT NOT NULL,
    id TEXT NOT NULL,
    source_info TEXT,
    collector_info TEXT,
    PRIMARY KEY (builder_type, id)
);

CREATE TABLE IF NOT EXISTS attestations (
    digest TEXT PRIMARY KEY,
    file_path TEXT,
    attestation_type TEXT,
    source_info TEXT,
    collector_info TEXT,
    payload TEXT
);

CREATE TABLE IF NOT EXISTS metadata (
    metadata_type TEXT NOT NULL,
    id TEXT NOT NULL,
    source_info TEXT,
    collector_info TEXT,
    payload TEXT,
    PRIMARY KEY (metadata_type, id)
);

CREATE TABLE IF NOT EXISTS identities (
    digest TEXT PRIMARY KEY,
    id TEXT NOT NULL,
    key TEXT,
    key_type TEXT,
    key_scheme TEXT,
    source_info TEXT,
    collector_info TEXT
);

CREATE TABLE IF NOT EXISTS vulnerabilities (
    id TEXT PRIMARY KEY,
    source_info TEXT,
    collector_info TEXT
);

CREATE TABLE IF NOT EXISTS edges (
    from_kind TEXT NOT NULL,
    from_key TEXT NOT NULL,
    from_key2 TEXT NOT NULL DEFAULT '',
    edge TEXT NOT NULL,
    to_kind TEXT NOT NULL,
    to_key TEXT NOT NULL,
    to_key2 TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (from_kind, from_key, from_key2, edge, to_kind, to_key, to_key2)
) WITHOUT ROWID;
";

/// Node kinds as stored in `edges.from_kind` / `edges.to_kind`.
pub mod kind {
    pub const ARTIFACT: &str = "Artifact";
    pub const PACKAGE: &str = "Package";
    pub const BUILDER: &str = "Builder";
    pub const ATTESTATION: &str = "Attestation";
    pub const METADATA: &str = "Metadata";
    pub const IDENTITY: &str = "Identity";
    pub const VULNERABILITY: &str = "Vulnerability";
}

/// Edge names as stored in `edges.edge`.
pub mod edge {
    pub const BUILT_BY: &str = "builtBy";
    pub const DEPENDS_ON: &str = "dependsOn";
    pub const CONTAINS: &str = "contains";
    pub const ATTESTED_OBJECTS: &str = "attestedObjects";
    pub const VULNERABILITIES: &str = "vulnerabilities";
    pub const ATTACHED_TO: &str = "attachedTo";
    pub const ATTESTATIONS: &str = "attestations";
}
