//! Telemetry configuration.

use std::time::Duration;

use super::parse::{env_bool, env_duration, env_opt};
use super::ConfigError;

/// Default flush budget, as accepted by `FLUSH_TIMEOUT`.
const DEFAULT_FLUSH_TIMEOUT: &str = "2000ms";

/// Telemetry configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Upper bound for each flush (FLUSH_TIMEOUT, default: 2000ms).
    pub flush_timeout: Duration,
    /// Attach cookies, credentials, bodies and client IPs (SEND_DEFAULT_PII).
    pub send_default_pii: bool,
    /// Sentry DSN; selects the Sentry client when the `sentry` feature is on.
    pub dsn: Option<String>,
    /// Deployment environment tag (SENTRY_ENVIRONMENT).
    pub environment: Option<String>,
    /// Release tag (SENTRY_RELEASE, default: crate version).
    pub release: String,
}

impl TelemetryConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let flush_timeout = env_duration("FLUSH_TIMEOUT", DEFAULT_FLUSH_TIMEOUT)?.ok_or_else(|| {
            ConfigError::Invalid {
                key: "FLUSH_TIMEOUT".into(),
                message: "flush timeout must be greater than zero".into(),
            }
        })?;

        Ok(Self {
            flush_timeout,
            send_default_pii: env_bool("SEND_DEFAULT_PII", false),
            dsn: env_opt("SENTRY_DSN"),
            environment: env_opt("SENTRY_ENVIRONMENT"),
            release: env_opt("SENTRY_RELEASE")
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        })
    }

    /// Base tags applied to every captured event.
    pub fn tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![("release", self.release.clone())];
        if let Some(ref environment) = self.environment {
            tags.push(("environment", environment.clone()));
        }
        tags
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            flush_timeout: Duration::from_millis(2000),
            send_default_pii: false,
            dsn: None,
            environment: None,
            release: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
