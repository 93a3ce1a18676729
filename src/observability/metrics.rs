//! Prometheus metrics for the handler wrapper.
//!
//! Covers what the wrapper itself does: exceptions captured or skipped,
//! flush outcomes and latency per call site, and finished transactions.

use prometheus::{Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

/// Metrics registry with all wrapper metrics.
pub struct Metrics {
    registry: Registry,

    /// Exceptions forwarded to the telemetry client
    pub exceptions_captured_total: Counter,

    /// Captures skipped because no scope was available or the event was dropped
    pub captures_skipped_total: Counter,

    /// Flushes by site (handler, finalize) and outcome (ok, pending, failed, timeout)
    pub flushes_total: CounterVec,

    /// Flush wall time in seconds by site
    pub flush_duration_seconds: HistogramVec,

    /// Transactions finished by the response interceptor
    pub transactions_finished_total: Counter,
}

impl Metrics {
    /// Create a new registry with all metrics registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Flush budgets are seconds at most
        let flush_buckets = vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0];

        let exceptions_captured_total = Counter::with_opts(Opts::new(
            "tokio_sentry_exceptions_captured_total",
            "Exceptions forwarded to the telemetry client",
        ))?;
        registry.register(Box::new(exceptions_captured_total.clone()))?;

        let captures_skipped_total = Counter::with_opts(Opts::new(
            "tokio_sentry_captures_skipped_total",
            "Exception captures skipped",
        ))?;
        registry.register(Box::new(captures_skipped_total.clone()))?;

        let flushes_total = CounterVec::new(
            Opts::new("tokio_sentry_flushes_total", "Telemetry flushes"),
            &["site", "outcome"],
        )?;
        registry.register(Box::new(flushes_total.clone()))?;

        let flush_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "tokio_sentry_flush_duration_seconds",
                "Telemetry flush duration in seconds",
            )
            .buckets(flush_buckets),
            &["site"],
        )?;
        registry.register(Box::new(flush_duration_seconds.clone()))?;

        let transactions_finished_total = Counter::with_opts(Opts::new(
            "tokio_sentry_transactions_finished_total",
            "Request transactions finished",
        ))?;
        registry.register(Box::new(transactions_finished_total.clone()))?;

        Ok(Self {
            registry,
            exceptions_captured_total,
            captures_skipped_total,
            flushes_total,
            flush_duration_seconds,
            transactions_finished_total,
        })
    }

    /// Record one flush.
    pub fn record_flush(&self, site: &str, outcome: &str, duration_secs: f64) {
        self.flushes_total.with_label_values(&[site, outcome]).inc();
        self.flush_duration_seconds
            .with_label_values(&[site])
            .observe(duration_secs);
    }

    /// Count of flushes recorded for `site` and `outcome`.
    pub fn flush_count(&self, site: &str, outcome: &str) -> u64 {
        self.flushes_total.with_label_values(&[site, outcome]).get() as u64
    }

    /// Export all metrics in Prometheus text format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
