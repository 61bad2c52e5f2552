//! Concurrent access to shared backends.
//!
//! Queries and ingests run from many threads against one `Arc` backend;
//! every read must observe a complete batch or none of it.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use provgraph::models::{ArtifactRecord, IngestBatch, NodeRef, PackageRecord};
use provgraph::storage::{GraphStore, SqliteBackend};
use provgraph::{Error, InMemoryBackend, QueryContext};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

const WRITERS: usize = 4;
const BATCHES_PER_WRITER: usize = 10;

/// Each batch adds a package and an artifact depending on it.
fn batch(writer: usize, n: usize) -> IngestBatch {
    let purl = format!("pkg:generic/w{writer}-n{n}@1");
    IngestBatch::new()
        .with_package(PackageRecord::new(&purl).unwrap())
        .with_artifact(
            ArtifactRecord::new(&format!("sha256:w{writer}n{n}"))
                .unwrap()
                .depends_on(NodeRef::package(&purl).unwrap()),
        )
}

fn hammer(store: &Arc<dyn GraphStore>) {
    let mut handles = Vec::new();

    for writer in 0..WRITERS {
        let store = Arc::clone(store);
        handles.push(thread::spawn(move || {
            for n in 0..BATCHES_PER_WRITER {
                store
                    .ingest(&QueryContext::new(), &batch(writer, n))
                    .expect("ingest");
            }
        }));
    }

    for _ in 0..WRITERS {
        let store = Arc::clone(store);
        handles.push(thread::spawn(move || {
            for _ in 0..BATCHES_PER_WRITER {
                let ctx = QueryContext::new();
                let artifacts = store.artifacts(&ctx).expect("artifacts");
                let packages = store.packages(&ctx).expect("packages");
                // Every visible artifact carries its resolved dependency.
                for artifact in &artifacts {
                    assert_eq!(artifact.depends_on.len(), 1);
                }
                // Packages are read later and the graph only grows.
                assert!(packages.len() >= artifacts.len());
            }
        }));
    }

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    let ctx = QueryContext::new();
    assert_eq!(
        store.artifacts(&ctx).unwrap().len(),
        WRITERS * BATCHES_PER_WRITER
    );
    assert_eq!(
        store.packages(&ctx).unwrap().len(),
        WRITERS * BATCHES_PER_WRITER
    );
}

#[test]
fn test_memory_backend_concurrent_ingest_and_query() {
    let store: Arc<dyn GraphStore> = Arc::new(InMemoryBackend::new());
    hammer(&store);
}

#[test]
fn test_sqlite_backend_concurrent_ingest_and_query() {
    let dir = TempDir::new().unwrap();
    let store: Arc<dyn GraphStore> =
        Arc::new(SqliteBackend::new(dir.path().join("graph.db")).unwrap());
    hammer(&store);
}

#[test]
fn test_cancel_from_another_thread() {
    let store: Arc<dyn GraphStore> = Arc::new(InMemoryBackend::new());
    let ctx = QueryContext::new();
    let signal = ctx.signal().clone();

    thread::spawn(move || signal.cancel())
        .join()
        .expect("cancel thread");

    let err = store.artifacts(&ctx).unwrap_err();
    assert_eq!(err.code(), "CANCELLED");
}

const LARGE_GRAPH: usize = 20_000;

/// Artifacts each depending on their own package.
fn large(store: Arc<dyn GraphStore>) -> Arc<dyn GraphStore> {
    let batch = (0..LARGE_GRAPH).fold(IngestBatch::new(), |batch, i| {
        let purl = format!("pkg:generic/large-{i}@1");
        batch
            .with_package(PackageRecord::new(&purl).unwrap())
            .with_artifact(
                ArtifactRecord::new(&format!("sha256:{i:064x}"))
                    .unwrap()
                    .depends_on(NodeRef::package(&purl).unwrap()),
            )
    });
    store.ingest(&QueryContext::new(), &batch).expect("ingest");
    store
}

fn large_memory() -> Arc<dyn GraphStore> {
    large(Arc::new(InMemoryBackend::new()))
}

fn large_sqlite() -> Arc<dyn GraphStore> {
    large(Arc::new(SqliteBackend::in_memory().unwrap()))
}

#[test]
fn test_cancel_stops_a_running_query() {
    for store in [large_memory(), large_sqlite()] {
        let ctx = QueryContext::new();
        let signal = ctx.signal().clone();
        let started = Arc::new(Barrier::new(2));

        let canceller = {
            let started = Arc::clone(&started);
            thread::spawn(move || {
                started.wait();
                thread::sleep(Duration::from_millis(1));
                signal.cancel();
            })
        };
        started.wait();
        let result = store.artifacts(&ctx);
        canceller.join().expect("cancel thread");

        assert!(
            matches!(result, Err(Error::Cancelled { ref reason, .. }) if reason == "cancelled"),
            "{}: expected cancellation, got {result:?}",
            store.name()
        );
    }
}

#[test]
fn test_short_deadline_stops_a_running_query() {
    for store in [large_memory(), large_sqlite()] {
        let ctx = QueryContext::new().with_timeout(Duration::from_millis(2));

        let err = store.packages(&ctx).unwrap_err();
        assert!(
            matches!(err, Error::Cancelled { ref reason, .. } if reason == "deadline exceeded"),
            "{}: {err}",
            store.name()
        );
    }

    // The same graph completes without a deadline.
    let store = large_memory();
    assert_eq!(store.packages(&QueryContext::new()).unwrap().len(), LARGE_GRAPH);
}
