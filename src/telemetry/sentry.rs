//! Sentry-backed telemetry client and transaction adapter.
//!
//! ```rust,ignore
//! let _guard = sentry::init(dsn);
//! let client = SentryClient::new(sentry::Hub::current());
//! let telemetry = Telemetry::new(Arc::new(client));
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use sentry::protocol;

use super::{
    Event, EventId, ExceptionValue, Level, Mechanism, RequestData, Scope, SpanStatus,
    TelemetryClient, TelemetryError, Transaction,
};

/// Client forwarding events to a Sentry [`Hub`](sentry::Hub).
pub struct SentryClient {
    hub: Arc<sentry::Hub>,
}

impl SentryClient {
    pub fn new(hub: Arc<sentry::Hub>) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl TelemetryClient for SentryClient {
    fn current_scope(&self) -> Option<Scope> {
        // Hub scopes are applied by the hub itself on capture.
        self.hub.client().map(|_| Scope::new())
    }

    fn capture_event(&self, event: Event, scope: &Scope) -> Option<EventId> {
        let event = scope.apply_to_event(event)?;
        Some(self.hub.capture_event(to_sentry_event(event)))
    }

    async fn flush(&self, timeout: Duration) -> Result<bool, TelemetryError> {
        let Some(client) = self.hub.client() else {
            return Ok(false);
        };
        tokio::task::spawn_blocking(move || client.flush(Some(timeout)))
            .await
            .map_err(|e| TelemetryError::Flush(e.to_string()))
    }
}

/// [`Transaction`] over a Sentry performance transaction.
pub struct SentryTransaction {
    name: String,
    inner: sentry::Transaction,
}

impl SentryTransaction {
    /// Start a server transaction on the current hub.
    pub fn start(name: impl Into<String>) -> Self {
        let name = name.into();
        let ctx = sentry::TransactionContext::new(&name, "http.server");
        Self {
            inner: sentry::start_transaction(ctx),
            name,
        }
    }
}

impl Transaction for SentryTransaction {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_http_status(&mut self, status: StatusCode) {
        self.inner.set_data("http.response.status_code", status.as_u16().into());
        self.inner
            .set_status(to_sentry_status(SpanStatus::from_http(status)));
    }

    fn finish(self: Box<Self>) {
        self.inner.finish();
    }
}

fn to_sentry_event(event: Event) -> protocol::Event<'static> {
    protocol::Event {
        event_id: event.event_id,
        level: to_sentry_level(event.level),
        transaction: event.transaction,
        // Sentry lists the innermost cause first.
        exception: event
            .exception
            .into_iter()
            .rev()
            .map(to_sentry_exception)
            .collect::<Vec<_>>()
            .into(),
        request: event.request.map(to_sentry_request),
        tags: event.tags.into_iter().collect(),
        ..Default::default()
    }
}

fn to_sentry_exception(value: ExceptionValue) -> protocol::Exception {
    protocol::Exception {
        ty: value.ty,
        value: Some(value.value),
        mechanism: value.mechanism.map(to_sentry_mechanism),
        ..Default::default()
    }
}

fn to_sentry_mechanism(mechanism: Mechanism) -> protocol::Mechanism {
    protocol::Mechanism {
        ty: mechanism.ty.unwrap_or_else(|| "generic".to_string()),
        handled: mechanism.handled,
        data: mechanism.data.into_iter().collect(),
        ..Default::default()
    }
}

fn to_sentry_request(request: RequestData) -> protocol::Request {
    let mut env = protocol::Map::new();
    if let Some(ip) = request.client_ip {
        env.insert("REMOTE_ADDR".to_string(), ip);
    }
    protocol::Request {
        url: request.url.parse().ok(),
        method: Some(request.method),
        query_string: request.query_string,
        data: request.data,
        headers: request.headers.into_iter().collect(),
        env,
        ..Default::default()
    }
}

fn to_sentry_level(level: Level) -> protocol::Level {
    match level {
        Level::Fatal => protocol::Level::Fatal,
        Level::Error => protocol::Level::Error,
        Level::Warning => protocol::Level::Warning,
        Level::Info => protocol::Level::Info,
        Level::Debug => protocol::Level::Debug,
    }
}

fn to_sentry_status(status: SpanStatus) -> protocol::SpanStatus {
    match status {
        SpanStatus::Ok => protocol::SpanStatus::Ok,
        SpanStatus::Unauthenticated => protocol::SpanStatus::Unauthenticated,
        SpanStatus::PermissionDenied => protocol::SpanStatus::PermissionDenied,
        SpanStatus::NotFound => protocol::SpanStatus::NotFound,
        SpanStatus::AlreadyExists => protocol::SpanStatus::AlreadyExists,
        SpanStatus::FailedPrecondition => protocol::SpanStatus::FailedPrecondition,
        SpanStatus::ResourceExhausted => protocol::SpanStatus::ResourceExhausted,
        SpanStatus::InvalidArgument => protocol::SpanStatus::InvalidArgument,
        SpanStatus::Unimplemented => protocol::SpanStatus::Unimplemented,
        SpanStatus::Unavailable => protocol::SpanStatus::Unavailable,
        SpanStatus::DeadlineExceeded => protocol::SpanStatus::DeadlineExceeded,
        SpanStatus::InternalError => protocol::SpanStatus::InternalError,
        SpanStatus::UnknownError => protocol::SpanStatus::UnknownError,
    }
}
