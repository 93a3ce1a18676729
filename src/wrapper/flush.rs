//! Bounded, failure-isolated telemetry flush.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tracing::{debug, warn};

use super::Telemetry;

/// Slack granted on top of the flush budget before the wait is abandoned.
const FLUSH_GRACE: Duration = Duration::from_millis(100);

/// Where a flush was issued from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushSite {
    /// After the handler returned, errored or panicked.
    Handler,
    /// Inside the response interceptor, before the response is sent.
    Finalize,
}

impl FlushSite {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FlushSite::Handler => "handler",
            FlushSite::Finalize => "finalize",
        }
    }
}

/// Result of one flush. Never an error: failures are logged and absorbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue drained.
    Flushed,
    /// Client gave up within its budget with events still queued.
    Pending,
    /// Client reported an error or panicked.
    Failed,
    /// Client ignored its budget and the wait was abandoned.
    TimedOut,
}

impl FlushOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FlushOutcome::Flushed => "ok",
            FlushOutcome::Pending => "pending",
            FlushOutcome::Failed => "failed",
            FlushOutcome::TimedOut => "timeout",
        }
    }
}

impl Telemetry {
    /// Flush the client, waiting at most the flush budget (plus grace).
    pub async fn flush(&self, site: FlushSite) -> FlushOutcome {
        let started = Instant::now();
        let budget = self.flush_timeout;
        let pending = AssertUnwindSafe(self.client.flush(budget)).catch_unwind();

        let outcome = match tokio::time::timeout(budget + FLUSH_GRACE, pending).await {
            Ok(Ok(Ok(true))) => FlushOutcome::Flushed,
            Ok(Ok(Ok(false))) => {
                debug!(
                    site = site.as_str(),
                    timeout_ms = budget.as_millis() as u64,
                    "telemetry flush left events queued"
                );
                FlushOutcome::Pending
            }
            Ok(Ok(Err(e))) => {
                warn!(site = site.as_str(), error = %e, "telemetry flush failed");
                FlushOutcome::Failed
            }
            Ok(Err(_)) => {
                warn!(site = site.as_str(), "telemetry client panicked during flush");
                FlushOutcome::Failed
            }
            Err(_) => {
                warn!(
                    site = site.as_str(),
                    timeout_ms = budget.as_millis() as u64,
                    "telemetry flush exceeded its budget"
                );
                FlushOutcome::TimedOut
            }
        };

        let elapsed = started.elapsed();
        debug!(
            site = site.as_str(),
            outcome = outcome.as_str(),
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "telemetry flush done"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_flush(site.as_str(), outcome.as_str(), elapsed.as_secs_f64());
        }

        outcome
    }
}
