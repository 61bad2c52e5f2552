//! Query service held by the transport layer.
//!
//! Wraps an `Arc<dyn Backend>` with tracing spans, metrics, a default
//! deadline and the [`QueryResponse`] envelope. The service adds no query
//! semantics of its own: every call is a single contract operation.

use crate::context::{DEFAULT_MAX_DEPTH, QueryContext};
use crate::models::{Artifact, Attestation, Builder, Identity, Metadata, Package, Vulnerability};
use crate::observability::metrics::record_query;
use crate::storage::Backend;
use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Contract operations reachable through the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `artifacts`
    Artifacts,
    /// `packages`
    Packages,
    /// `builders`
    Builders,
    /// `attestations`
    Attestations,
    /// `metadata`
    Metadata,
    /// `identities`
    Identities,
    /// `vulnerabilities`
    Vulnerabilities,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Self; 7] = [
        Self::Artifacts,
        Self::Packages,
        Self::Builders,
        Self::Attestations,
        Self::Metadata,
        Self::Identities,
        Self::Vulnerabilities,
    ];

    /// Returns the operation name (also the response data field).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Artifacts => "artifacts",
            Self::Packages => "packages",
            Self::Builders => "builders",
            Self::Attestations => "attestations",
            Self::Metadata => "metadata",
            Self::Identities => "identities",
            Self::Vulnerabilities => "vulnerabilities",
        }
    }

    /// Parses an operation name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == s)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One error entry of a [`QueryResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseError {
    /// Stable error code (see [`Error::code`]).
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    /// Operation that failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl ResponseError {
    /// Builds an entry from an error.
    #[must_use]
    pub fn from_error(err: &Error, operation: Option<&str>) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            operation: operation.map(str::to_string),
        }
    }
}

/// Query-level response envelope.
///
/// Either `data` is present and `errors` is empty, or `data` is `null` and
/// `errors` holds exactly one entry. Partial data is never returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse<T> {
    /// Result data, absent on failure.
    pub data: Option<T>,
    /// Errors, empty on success.
    pub errors: Vec<ResponseError>,
}

impl<T> QueryResponse<T> {
    /// Successful response.
    #[must_use]
    pub const fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Failed response.
    #[must_use]
    pub fn error(err: &Error, operation: Option<&str>) -> Self {
        Self {
            data: None,
            errors: vec![ResponseError::from_error(err, operation)],
        }
    }

    /// Wraps a contract result.
    #[must_use]
    pub fn from_result(result: Result<T>, operation: Option<&str>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::error(&err, operation),
        }
    }

    /// Returns true if the call succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.data.is_some()
    }
}

/// Service wrapping a shared backend.
#[derive(Clone)]
pub struct QueryService {
    backend: Arc<dyn Backend>,
    default_timeout: Option<Duration>,
    max_depth: usize,
}

impl fmt::Debug for QueryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryService")
            .field("backend", &self.backend.name())
            .field("default_timeout", &self.default_timeout)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl QueryService {
    /// Creates a service over a shared backend.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            default_timeout: None,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Sets the deadline applied by [`QueryService::context`].
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the dependency chain bound applied by [`QueryService::context`].
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Creates a context carrying the default deadline, if any, and the
    /// configured depth bound.
    #[must_use]
    pub fn context(&self) -> QueryContext {
        let ctx = QueryContext::new().with_max_depth(self.max_depth);
        match self.default_timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    /// Lists artifacts.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn artifacts(&self, ctx: &QueryContext) -> Result<Vec<Artifact>> {
        self.run(Operation::Artifacts, ctx, |b, c| b.artifacts(c))
    }

    /// Lists packages.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn packages(&self, ctx: &QueryContext) -> Result<Vec<Package>> {
        self.run(Operation::Packages, ctx, |b, c| b.packages(c))
    }

    /// Lists builders.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn builders(&self, ctx: &QueryContext) -> Result<Vec<Builder>> {
        self.run(Operation::Builders, ctx, |b, c| b.builders(c))
    }

    /// Lists attestations.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn attestations(&self, ctx: &QueryContext) -> Result<Vec<Attestation>> {
        self.run(Operation::Attestations, ctx, |b, c| b.attestations(c))
    }

    /// Lists metadata nodes.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn metadata(&self, ctx: &QueryContext) -> Result<Vec<Metadata>> {
        self.run(Operation::Metadata, ctx, |b, c| b.metadata(c))
    }

    /// Lists identities.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn identities(&self, ctx: &QueryContext) -> Result<Vec<Identity>> {
        self.run(Operation::Identities, ctx, |b, c| b.identities(c))
    }

    /// Lists vulnerabilities.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error.
    pub fn vulnerabilities(&self, ctx: &QueryContext) -> Result<Vec<Vulnerability>> {
        self.run(Operation::Vulnerabilities, ctx, |b, c| b.vulnerabilities(c))
    }

    /// Runs `op` and wraps the result as `{ "<op>": [...] }` in an envelope.
    #[must_use]
    pub fn execute(&self, op: Operation, ctx: &QueryContext) -> QueryResponse<Value> {
        let result = match op {
            Operation::Artifacts => self.artifacts(ctx).and_then(to_value),
            Operation::Packages => self.packages(ctx).and_then(to_value),
            Operation::Builders => self.builders(ctx).and_then(to_value),
            Operation::Attestations => self.attestations(ctx).and_then(to_value),
            Operation::Metadata => self.metadata(ctx).and_then(to_value),
            Operation::Identities => self.identities(ctx).and_then(to_value),
            Operation::Vulnerabilities => self.vulnerabilities(ctx).and_then(to_value),
        };
        let wrapped = result.map(|list| {
            let mut data = serde_json::Map::new();
            data.insert(op.as_str().to_string(), list);
            Value::Object(data)
        });
        QueryResponse::from_result(wrapped, Some(op.as_str()))
    }

    /// Lists artifacts without blocking the async runtime.
    ///
    /// The backend call runs on the blocking pool. If the context deadline
    /// passes first, the context is cancelled so the backend stops at its
    /// next check, and [`Error::Cancelled`] is returned immediately.
    ///
    /// # Errors
    ///
    /// Propagates the backend's error, or [`Error::Cancelled`] on deadline.
    pub async fn artifacts_async(&self, ctx: &QueryContext) -> Result<Vec<Artifact>> {
        let service = self.clone();
        self.run_blocking(Operation::Artifacts, ctx, move |c| service.artifacts(c))
            .await
    }

    /// Runs [`QueryService::execute`] without blocking the async runtime.
    pub async fn execute_async(&self, op: Operation, ctx: &QueryContext) -> QueryResponse<Value> {
        let service = self.clone();
        let result = self
            .run_blocking(op, ctx, move |c| Ok(service.execute(op, c)))
            .await;
        match result {
            Ok(response) => response,
            Err(err) => QueryResponse::error(&err, Some(op.as_str())),
        }
    }

    async fn run_blocking<T, F>(&self, op: Operation, ctx: &QueryContext, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&QueryContext) -> Result<T> + Send + 'static,
    {
        let worker_ctx = ctx.clone();
        let task = tokio::task::spawn_blocking(move || call(&worker_ctx));

        let joined = match ctx.remaining() {
            Some(remaining) => match tokio::time::timeout(remaining, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    ctx.cancel();
                    tracing::warn!(operation = %op, request_id = %ctx.request_id(), "Query deadline exceeded");
                    return Err(Error::Cancelled {
                        operation: op.as_str().to_string(),
                        reason: "deadline exceeded".to_string(),
                    });
                },
            },
            None => task.await,
        };

        joined.map_err(|e| Error::QueryFailed {
            operation: op.as_str().to_string(),
            cause: format!("worker task failed: {e}"),
        })?
    }

    fn run<T>(
        &self,
        op: Operation,
        ctx: &QueryContext,
        call: impl FnOnce(&dyn Backend, &QueryContext) -> Result<Vec<T>>,
    ) -> Result<Vec<T>> {
        let backend = self.backend.name();
        let span = tracing::info_span!(
            "query",
            backend,
            operation = op.as_str(),
            request_id = %ctx.request_id()
        );
        let _enter = span.enter();

        let start = Instant::now();
        let result = call(self.backend.as_ref(), ctx);
        let status = if result.is_ok() { "success" } else { "error" };
        record_query(backend, op.as_str(), start, status);

        match &result {
            Ok(items) => tracing::debug!(count = items.len(), "Query completed"),
            Err(err) => tracing::warn!(code = err.code(), error = %err, "Query failed"),
        }
        result
    }
}

fn to_value<T: Serialize>(items: Vec<T>) -> Result<Value> {
    serde_json::to_value(items).map_err(|e| Error::OperationFailed {
        operation: "serialize_response".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactRecord, IngestBatch};
    use crate::storage::{InMemoryArgs, InMemoryBackend};

    fn service() -> (Arc<InMemoryBackend>, QueryService) {
        let seed = IngestBatch::new().with_artifact(ArtifactRecord::new("sha256:abc").unwrap());
        let backend = Arc::new(InMemoryBackend::with_args(&InMemoryArgs { seed }).unwrap());
        let service = QueryService::new(backend.clone());
        (backend, service)
    }

    #[test]
    fn test_execute_wraps_data_by_operation() {
        let (_, service) = service();
        let response = service.execute(Operation::Artifacts, &service.context());

        assert!(response.is_ok());
        assert!(response.errors.is_empty());
        let data = response.data.unwrap();
        assert_eq!(data["artifacts"][0]["digest"], "sha256:abc");
    }

    #[test]
    fn test_failure_never_carries_partial_data() {
        let (backend, service) = service();
        backend.set_unavailable(Some("down"));

        let response = service.execute(Operation::Artifacts, &service.context());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["data"], Value::Null);
        assert_eq!(json["errors"][0]["code"], "BACKEND_UNAVAILABLE");
        assert_eq!(json["errors"][0]["operation"], "artifacts");
        assert_eq!(response.errors.len(), 1);
    }

    #[test]
    fn test_operation_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::parse(op.as_str()), Some(op));
        }
        assert_eq!(Operation::parse("Artifacts"), None);
    }

    #[test]
    fn test_default_timeout_sets_deadline() {
        let (_, service) = service();
        let service = service.with_default_timeout(Some(Duration::from_secs(5)));
        assert!(service.context().deadline().is_some());
    }

    #[test]
    fn test_context_carries_max_depth() {
        let (_, service) = service();
        assert_eq!(service.context().max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(service.with_max_depth(32).context().max_depth(), 32);
    }

    #[tokio::test]
    async fn test_artifacts_async() {
        let (_, service) = service();
        let ctx = service.context();
        let artifacts = service.artifacts_async(&ctx).await.unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[tokio::test]
    async fn test_artifacts_async_past_deadline_is_cancelled() {
        let (_, service) = service();
        let ctx = QueryContext::new().with_deadline(Instant::now());

        let err = service.artifacts_async(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_execute_async_reports_cancellation_in_envelope() {
        let (_, service) = service();
        let ctx = service.context();
        ctx.cancel();

        let response = service.execute_async(Operation::Packages, &ctx).await;
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].code, "CANCELLED");
    }
}
