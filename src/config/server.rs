//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::parse::{env_or, env_parse};
use super::ConfigError;

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8080).
    pub listen_addr: SocketAddr,
    /// Graceful shutdown drain timeout.
    pub drain_timeout: Duration,
    /// Header read timeout for HTTP/1 connections.
    pub header_timeout: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr: SocketAddr = env_or("LISTEN_ADDR", "0.0.0.0:8080")
            .parse()
            .map_err(|e| ConfigError::Parse {
                key: "LISTEN_ADDR".into(),
                value: env_or("LISTEN_ADDR", "0.0.0.0:8080"),
                error: format!("{}", e),
            })?;

        let drain_timeout_secs: u64 = env_parse("DRAIN_TIMEOUT_SECS", 30)?;
        let header_timeout_secs: u64 = env_parse("HEADER_TIMEOUT_SECS", 5)?;

        Ok(Self {
            listen_addr,
            drain_timeout: Duration::from_secs(drain_timeout_secs),
            header_timeout: Duration::from_secs(header_timeout_secs),
        })
    }

    /// Config bound to `addr` with default timeouts.
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            listen_addr: addr,
            ..Default::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            drain_timeout: Duration::from_secs(30),
            header_timeout: Duration::from_secs(5),
        }
    }
}
