//! Telemetry client interface consumed by the handler wrapper.
//!
//! The wrapper never talks to a collector directly. It goes through
//! [`TelemetryClient`], which exposes the small capability set it needs:
//!
//! | Capability | Method |
//! |------------|--------|
//! | Ambient scope lookup | [`TelemetryClient::current_scope`] |
//! | Scoped capture | [`with_scope`] + [`TelemetryClient::capture_event`] |
//! | Bounded flush | [`TelemetryClient::flush`] |
//!
//! # Available Clients
//!
//! | Client | Feature | Description |
//! |--------|---------|-------------|
//! | [`LogClient`] | - | Queues events and writes them as structured log lines on flush |
//! | `SentryClient` | `sentry` | Forwards events to a Sentry hub |
//!
//! Transactions attached to responses implement [`Transaction`]; adapters exist
//! for Sentry (`sentry`) and OpenTelemetry (`otel`).

mod event;
mod log_client;
mod request_data;
mod scope;
mod transaction;

#[cfg(feature = "otel")]
pub mod otel;

#[cfg(feature = "sentry")]
pub mod sentry;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use event::{add_exception_mechanism, Event, EventId, ExceptionValue, Level, Mechanism};
pub use log_client::{LogClient, TELEMETRY_TARGET};
pub use request_data::{parse_request, RequestData, MAX_REQUEST_BODY};
pub use scope::{EventProcessor, Scope};
pub use transaction::{SpanStatus, Transaction};

/// Errors reported by telemetry clients.
#[derive(Debug)]
pub enum TelemetryError {
    /// The client could not drain its queue.
    Flush(String),

    /// The event could not be accepted.
    Capture(String),

    /// Network or transport failure.
    Transport(String),

    /// The operation exceeded its time budget.
    Timeout { timeout_ms: u64 },
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::Flush(msg) => write!(f, "flush failed: {}", msg),
            TelemetryError::Capture(msg) => write!(f, "capture failed: {}", msg),
            TelemetryError::Transport(msg) => write!(f, "transport error: {}", msg),
            TelemetryError::Timeout { timeout_ms } => {
                write!(f, "telemetry timed out after {}ms", timeout_ms)
            }
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Collector client used by the wrapper.
///
/// Implementations must be safe to share between concurrently running
/// requests; the wrapper never serialises access.
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Fork of the ambient scope, or `None` when no scope is bound.
    fn current_scope(&self) -> Option<Scope>;

    /// Enrich `event` through `scope` and queue it for sending.
    ///
    /// Returns `None` when a scope processor dropped the event.
    fn capture_event(&self, event: Event, scope: &Scope) -> Option<EventId>;

    /// Wait up to `timeout` for queued events to be sent.
    ///
    /// `Ok(false)` means the budget ran out with events still queued.
    async fn flush(&self, timeout: Duration) -> Result<bool, TelemetryError>;
}

/// Run `f` with a fresh fork of the client's ambient scope.
///
/// Changes made to the scope inside `f` are discarded afterwards. Returns
/// `None` without calling `f` if the client has no ambient scope.
pub fn with_scope<R>(
    client: &dyn TelemetryClient,
    f: impl FnOnce(&mut Scope, &dyn TelemetryClient) -> R,
) -> Option<R> {
    let mut scope = client.current_scope()?;
    Some(f(&mut scope, client))
}
