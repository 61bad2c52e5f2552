//! Per-call query context.
//!
//! Every contract operation receives a [`QueryContext`] carrying a request id
//! for log correlation, an optional deadline and a cooperative cancellation
//! signal. Backends call [`QueryContext::check`] between storage steps and
//! abort with [`Error::Cancelled`] as soon as the signal trips or the deadline
//! passes. The context also bounds how deep a resolved dependency chain may
//! nest.

use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default bound on the nodes in one resolved `dependsOn`/`contains` chain.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Shared, clonable cancellation flag.
///
/// Clones observe the same flag, so the handle can be given to a Ctrl-C
/// handler or a timeout task while the query runs elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Creates an untripped signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trips the signal. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Context threaded through every backend call.
#[derive(Debug, Clone)]
pub struct QueryContext {
    request_id: String,
    deadline: Option<Instant>,
    signal: CancellationSignal,
    max_depth: usize,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryContext {
    /// Creates a context with a fresh request id, no deadline and an
    /// untripped signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            deadline: None,
            signal: CancellationSignal::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Uses an existing request id (e.g. propagated from the transport layer).
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Shares an existing cancellation signal.
    #[must_use]
    pub fn with_signal(mut self, signal: CancellationSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Bounds the nodes on any resolved dependency chain; at least 1.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline, if any.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns the dependency chain bound.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Returns the cancellation signal.
    #[must_use]
    pub const fn signal(&self) -> &CancellationSignal {
        &self.signal
    }

    /// Trips the cancellation signal.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Returns true if the signal tripped or the deadline passed.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.signal.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails if the call should stop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the signal tripped or the deadline
    /// passed.
    pub fn check(&self, operation: &str) -> Result<()> {
        if self.signal.is_cancelled() {
            return Err(Error::Cancelled {
                operation: operation.to_string(),
                reason: "cancelled".to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled {
                operation: operation.to_string(),
                reason: "deadline exceeded".to_string(),
            });
        }
        Ok(())
    }
}
