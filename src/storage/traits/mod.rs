//! Storage backend traits.

mod backend;
mod ingest;

pub use backend::{Backend, BackendArgs};
pub use ingest::{IngestBackend, IngestSummary};
