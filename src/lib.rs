//! tokio_sentry - Request-lifecycle telemetry for async HTTP handlers.
//!
//! Wraps a request handler so that, on every invocation, failures are
//! reported to an error-tracking client and queued telemetry is flushed
//! before the process may be frozen (the serverless hand-off problem).
//!
//! # Features
//!
//! - **Unhandled exception capture**: handler errors and panics are reported
//!   with `handled: false` and a snapshot of the request, then re-raised
//! - **Transaction finishing**: the response status is recorded on the
//!   attached transaction, which is finished before the response is sent
//! - **Bounded flush**: every exit path flushes with a time budget; flush
//!   failures never reach the caller
//! - **Pluggable clients**: structured-log client built in, Sentry and
//!   OpenTelemetry adapters behind features
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_sentry::telemetry::{LogClient, Scope};
//! use tokio_sentry::{Server, ServerConfig, Telemetry};
//!
//! let telemetry = Telemetry::new(Arc::new(LogClient::new(Scope::new())));
//! let handler = telemetry.wrap(|req: Request, res: ResponseWriter| async move {
//!     res.end("ok").await
//! });
//! Server::new(ServerConfig::default(), handler).run().await?;
//! ```

/// Package version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod config;
pub mod core;
pub mod logging;
pub mod observability;
pub mod server;
pub mod telemetry;
pub mod timestamp;
pub mod wrapper;

// Re-exports for convenience
pub use config::Config;
pub use crate::core::{Request, ResponseWriter};
pub use server::{Server, ServerConfig};
pub use wrapper::{wrap, Handler, Instrumented, Telemetry};
