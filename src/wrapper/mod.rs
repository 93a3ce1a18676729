//! Request-lifecycle instrumentation for async handlers.
//!
//! [`wrap`] turns a [`Handler`] into an [`Instrumented`] handler with the same
//! output and error types. Every invocation:
//!
//! 1. decorates the response's finalize operation with a
//!    [`FinalizeInterceptor`] *before* the handler runs,
//! 2. runs the handler,
//! 3. on `Err` or panic, captures the failure as an unhandled exception
//!    enriched with request data,
//! 4. flushes the telemetry client (bounded by the flush budget),
//! 5. hands back the handler's result, or resumes its panic.
//!
//! When the handler calls [`ResponseWriter::end`], the interceptor closes the
//! attached transaction, flushes once more and only then sends the response.
//!
//! ```text
//! caller ─▶ Instrumented::call ─▶ decorate(res) ─▶ handler(req, res)
//!                                                     │ res.end(body)
//!                                                     ▼
//!                        FinalizeInterceptor: status ─▶ finish ─▶ flush ─▶ inner.finalize
//!                                                     │
//! caller ◀── result ◀── flush ◀── capture (Err/panic) ◀┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_sentry::telemetry::{LogClient, Scope};
//! use tokio_sentry::wrapper::{Handler, Telemetry};
//!
//! let telemetry = Telemetry::new(Arc::new(LogClient::new(Scope::new())));
//! let handler = telemetry.wrap(|req: Request, res: ResponseWriter| async move {
//!     res.end(format!("hello {}", req.path())).await
//! });
//! ```

mod flush;
mod instrumented;
mod interceptor;

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::TelemetryConfig;
use crate::core::{Request, ResponseWriter};
use crate::observability::Metrics;
use crate::telemetry::TelemetryClient;

pub use flush::{FlushOutcome, FlushSite};
pub use instrumented::Instrumented;
pub use interceptor::FinalizeInterceptor;

/// Flush budget used unless configured otherwise.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(2000);

/// An async request handler.
///
/// Implemented for every `Fn(Request, ResponseWriter) -> impl Future<Output = Result<T, E>>`.
pub trait Handler: Send + Sync + 'static {
    type Output: Send + 'static;
    type Error: StdError + Send + Sync + 'static;

    fn call(
        &self,
        req: Request,
        res: ResponseWriter,
    ) -> BoxFuture<'static, Result<Self::Output, Self::Error>>;
}

impl<F, Fut, T, E> Handler for F
where
    F: Fn(Request, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: StdError + Send + Sync + 'static,
{
    type Output = T;
    type Error = E;

    fn call(&self, req: Request, res: ResponseWriter) -> BoxFuture<'static, Result<T, E>> {
        Box::pin((self)(req, res))
    }
}

/// Telemetry context injected into wrapped handlers.
#[derive(Clone)]
pub struct Telemetry {
    client: Arc<dyn TelemetryClient>,
    flush_timeout: Duration,
    send_default_pii: bool,
    metrics: Option<Arc<Metrics>>,
}

impl Telemetry {
    pub fn new(client: Arc<dyn TelemetryClient>) -> Self {
        Self {
            client,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            send_default_pii: false,
            metrics: None,
        }
    }

    /// Build from loaded configuration.
    pub fn from_config(client: Arc<dyn TelemetryClient>, config: &TelemetryConfig) -> Self {
        Self::new(client)
            .with_flush_timeout(config.flush_timeout)
            .with_default_pii(config.send_default_pii)
    }

    /// Upper bound for each flush call.
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Attach cookies, credentials, bodies and client IPs to events.
    pub fn with_default_pii(mut self, enabled: bool) -> Self {
        self.send_default_pii = enabled;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn client(&self) -> &Arc<dyn TelemetryClient> {
        &self.client
    }

    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    pub fn send_default_pii(&self) -> bool {
        self.send_default_pii
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Instrument `handler` with this context.
    pub fn wrap<H: Handler>(&self, handler: H) -> Instrumented<H> {
        Instrumented::new(handler, self.clone())
    }
}

/// Instrument `handler`; see the module docs for the lifecycle.
pub fn wrap<H: Handler>(telemetry: &Telemetry, handler: H) -> Instrumented<H> {
    telemetry.wrap(handler)
}
