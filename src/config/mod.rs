//! Configuration module for tokio_sentry.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_sentry::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! println!("Flush timeout: {:?}", config.telemetry.flush_timeout);
//! ```

mod error;
mod logging;
mod parse;
mod server;
mod telemetry;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use parse::parse_duration;
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Telemetry configuration.
    pub telemetry: TelemetryConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Listen: {}", self.server.listen_addr);
        info!(
            "  Flush timeout: {}ms",
            self.telemetry.flush_timeout.as_millis()
        );
        info!("  Release: {}", self.telemetry.release);

        if let Some(ref environment) = self.telemetry.environment {
            info!("  Environment: {}", environment);
        }

        if self.telemetry.dsn.is_some() {
            if cfg!(feature = "sentry") {
                info!("  Telemetry client: sentry");
            } else {
                info!("  Telemetry client: log (SENTRY_DSN set but the sentry feature is off)");
            }
        } else {
            info!("  Telemetry client: log");
        }

        if self.telemetry.send_default_pii {
            info!("  Default PII: enabled");
        }

        info!("  Drain timeout: {}s", self.server.drain_timeout.as_secs());
    }
}
