//! Server configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Command-line flags (see `main.rs`) override both.
//! Priority: CLI flags > environment > config file > defaults.

use crate::error::{Result, ServiceError};
use crate::service::ServiceConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_HOST: &str = "SKILLSHARE_HOST";
pub const ENV_PORT: &str = "SKILLSHARE_PORT";
pub const ENV_PUBLIC_DIR: &str = "SKILLSHARE_PUBLIC_DIR";
pub const ENV_POLL_TIMEOUT: &str = "SKILLSHARE_POLL_TIMEOUT";

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,

    /// Port to listen on (default: 8000)
    pub port: u16,

    /// Directory served for any path the API does not handle.
    pub public_dir: PathBuf,

    /// Seconds a long poll stays parked before answering empty (default: 90)
    pub poll_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            public_dir: PathBuf::from("./public"),
            poll_timeout_secs: 90,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `path` (if given) with environment
    /// variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Read a TOML file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config: ServerConfig = toml::from_str(&contents)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply overrides looked up by variable name. Unparseable numbers
    /// are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
            tracing::debug!("Overriding host from {ENV_HOST}");
        }

        if let Some(port_str) = lookup(ENV_PORT) {
            match port_str.parse::<u16>() {
                Ok(port) => {
                    self.port = port;
                    tracing::debug!("Overriding port from {ENV_PORT}");
                }
                Err(_) => tracing::warn!("Invalid {ENV_PORT} value: {}", port_str),
            }
        }

        if let Some(dir) = lookup(ENV_PUBLIC_DIR) {
            self.public_dir = PathBuf::from(dir);
            tracing::debug!("Overriding public_dir from {ENV_PUBLIC_DIR}");
        }

        if let Some(secs) = lookup(ENV_POLL_TIMEOUT) {
            match secs.parse::<u64>() {
                Ok(secs) => {
                    self.poll_timeout_secs = secs;
                    tracing::debug!("Overriding poll_timeout_secs from {ENV_POLL_TIMEOUT}");
                }
                Err(_) => tracing::warn!("Invalid {ENV_POLL_TIMEOUT} value: {}", secs),
            }
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}
