//! Business logic services.
//!
//! Services sit between the transport (CLI, embedders) and the storage
//! backends: backend selection and instrumented query execution.

mod backend_factory;
mod query;

pub use backend_factory::BackendFactory;
pub use query::{Operation, QueryResponse, QueryService, ResponseError};
