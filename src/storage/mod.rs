//! Storage layer abstraction.
//!
//! The query layer sees storage only through [`Backend`] (reads) and
//! [`IngestBackend`] (writes). Two reference implementations ship with the
//! crate:
//!
//! | Backend | Use Case | Snapshot model |
//! |---------|----------|----------------|
//! | [`InMemoryBackend`] | Tests, development | `Arc<GraphSnapshot>` swapped under an `RwLock` |
//! | [`SqliteBackend`] | Embedded, persistent | One transaction per call |
//!
//! Both store flat, identity-keyed records in a [`GraphSnapshot`] and
//! materialize fully-populated entities through the shared resolver.

// Allow significant_drop_tightening - a read holds the connection lock for the whole snapshot load.
#![allow(clippy::significant_drop_tightening)]

mod memory;
mod resolve;
pub mod snapshot;
mod sqlite;
pub mod traits;

pub use memory::{InMemoryArgs, InMemoryBackend};
pub use snapshot::GraphSnapshot;
pub use sqlite::{SqliteArgs, SqliteBackend};
pub use traits::{Backend, BackendArgs, IngestBackend, IngestSummary};

/// A backend that serves both the read contract and ingestion.
///
/// Blanket-implemented for every type implementing both traits. An
/// `Arc<dyn GraphStore>` upcasts to the `Arc<dyn Backend>` the query layer
/// holds.
pub trait GraphStore: Backend + IngestBackend {}

impl<T: Backend + IngestBackend> GraphStore for T {}
