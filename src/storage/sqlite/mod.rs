//! Embedded `SQLite` backend.
//!
//! ## Module Structure
//!
//! - `connection`: lock acquisition with poison recovery, pragmas, error classification
//! - `schema`: table layout
//! - `store`: row codec between tables and a [`GraphSnapshot`](crate::storage::GraphSnapshot)
//! - `backend`: [`SqliteBackend`] itself

mod backend;
mod connection;
mod schema;
mod store;

pub use backend::{SqliteArgs, SqliteBackend};
