//! `SQLite` backend integration tests against on-disk databases.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use provgraph::models::{
    ArtifactRecord, AttestationPayload, AttestationRecord, IngestBatch, NodeRef, VexPayload,
};
use provgraph::storage::{SqliteArgs, SqliteBackend};
use provgraph::{Backend, Error, IngestBackend, QueryContext};
use std::path::Path;
use tempfile::TempDir;

fn seed(path: &Path) {
    let backend = SqliteBackend::new(path).unwrap();
    let batch = IngestBatch::new()
        .with_artifact(ArtifactRecord::new("sha256:app").unwrap().with_name("app"))
        .with_attestation(
            AttestationRecord::new("sha256:att")
                .unwrap()
                .attests(NodeRef::artifact("sha256:app").unwrap())
                .with_payload(AttestationPayload::Vex(VexPayload::default())),
        );
    backend.ingest(&QueryContext::new(), &batch).unwrap();
}

#[test]
fn test_data_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    seed(&path);

    let reopened = SqliteBackend::new(&path).unwrap();
    let ctx = QueryContext::new();
    let artifacts = reopened.artifacts(&ctx).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].name.as_deref(), Some("app"));
    assert_eq!(reopened.attestations(&ctx).unwrap().len(), 1);
    assert_eq!(reopened.db_path(), Some(path.as_path()));
}

#[test]
fn test_read_only_serves_queries_and_rejects_ingest() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    seed(&path);

    let backend = SqliteBackend::open(&SqliteArgs::new(&path).read_only(true)).unwrap();
    let ctx = QueryContext::new();
    assert_eq!(backend.artifacts(&ctx).unwrap().len(), 1);

    let err = backend
        .ingest(
            &ctx,
            &IngestBatch::new().with_artifact(ArtifactRecord::new("sha256:new").unwrap()),
        )
        .unwrap_err();
    assert_eq!(err.code(), "QUERY_FAILED");
}

#[test]
fn test_missing_read_only_file_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let args = SqliteArgs::new(dir.path().join("absent.db")).read_only(true);

    let err = SqliteBackend::open(&args).err().unwrap();
    assert!(matches!(err, Error::BackendUnavailable { ref backend, .. } if backend == "sqlite"));
}

#[test]
fn test_stored_payload_with_unknown_typename_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    seed(&path);

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE attestations SET payload = ?1 WHERE digest = 'sha256:att'",
            [r#"{"__typename":"SLSAPayload"}"#],
        )
        .unwrap();
    }

    let backend = SqliteBackend::new(&path).unwrap();
    let ctx = QueryContext::new();

    let err = backend.attestations(&ctx).unwrap_err();
    assert!(matches!(err, Error::UnknownVariant { union: "AttestationPayload", ref found, .. } if found == "SLSAPayload"));

    // Artifact queries never decode payloads.
    assert_eq!(backend.artifacts(&ctx).unwrap().len(), 1);
}

#[test]
fn test_schema_creation_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    seed(&path);
    seed(&path);

    let backend = SqliteBackend::new(&path).unwrap();
    assert_eq!(backend.artifacts(&QueryContext::new()).unwrap().len(), 1);
}

#[test]
fn test_ingest_reads_only_rows_the_batch_touches() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.db");
    seed(&path);

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute(
            "UPDATE attestations SET payload = ?1 WHERE digest = 'sha256:att'",
            [r#"{"__typename":"SLSAPayload"}"#],
        )
        .unwrap();
    }

    let backend = SqliteBackend::new(&path).unwrap();
    let ctx = QueryContext::new();
    let summary = backend
        .ingest(
            &ctx,
            &IngestBatch::new()
                .with_artifact(ArtifactRecord::new("sha256:app").unwrap().with_tags(["release"]))
                .with_artifact(
                    ArtifactRecord::new("sha256:cli")
                        .unwrap()
                        .depends_on(NodeRef::artifact("sha256:app").unwrap()),
                ),
        )
        .unwrap();
    assert_eq!(summary.artifacts, 2);

    let artifacts = backend.artifacts(&ctx).unwrap();
    assert_eq!(artifacts.len(), 2);
    let app = artifacts.iter().find(|a| a.digest.as_str() == "sha256:app").unwrap();
    assert_eq!(app.name.as_deref(), Some("app"));
    assert_eq!(app.tags.len(), 1);
    let cli = artifacts.iter().find(|a| a.digest.as_str() == "sha256:cli").unwrap();
    assert_eq!(cli.depends_on[0].as_artifact().unwrap().digest.as_str(), "sha256:app");
}
