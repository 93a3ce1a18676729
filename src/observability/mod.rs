//! Observability for the wrapper itself.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_sentry::observability::Metrics;
//!
//! let metrics = Arc::new(Metrics::new()?);
//! let telemetry = Telemetry::new(client).with_metrics(Arc::clone(&metrics));
//! println!("{}", metrics.export());
//! ```

pub mod metrics;

pub use metrics::Metrics;
