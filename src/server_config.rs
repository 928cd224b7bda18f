use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for the HTTP + push-channel notification listeners. The HTTP listener binds
/// `base_port` and the push channel `base_port + 1`, shifted together on collision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Directory served over HTTP. Without one every request gets 404.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// How many consecutive base ports to try.
    #[serde(default = "default_port_scan_limit")]
    pub port_scan_limit: u16,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
    /// Upper bound on how long a listener or client thread takes to notice shutdown.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

const fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_base_port() -> u16 {
    8080
}

const fn default_port_scan_limit() -> u16 {
    100
}

const fn default_shutdown_timeout_ms() -> u64 {
    2_000
}

const fn default_send_timeout_ms() -> u64 {
    50
}

const fn default_client_queue_capacity() -> usize {
    256
}

const fn default_poll_interval_ms() -> u64 {
    50
}

const MAX_CLIENT_QUEUE_CAPACITY: usize = 65_536;
const MAX_TIMEOUT_MS: u64 = 60_000;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            base_port: default_base_port(),
            static_dir: None,
            port_scan_limit: default_port_scan_limit(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            client_queue_capacity: default_client_queue_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("server.host must not be empty".to_string()));
        }
        if self.base_port == 0 || self.base_port == u16::MAX {
            return Err(Error::InvalidConfig(format!(
                "server.base_port must be in 1..=65534, got {}",
                self.base_port
            )));
        }
        if self.port_scan_limit == 0 {
            return Err(Error::InvalidConfig(
                "server.port_scan_limit must be > 0".to_string(),
            ));
        }
        for (field, value) in [
            ("server.shutdown_timeout_ms", self.shutdown_timeout_ms),
            ("server.send_timeout_ms", self.send_timeout_ms),
            ("server.poll_interval_ms", self.poll_interval_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(Error::InvalidConfig(format!(
                    "{field} must be in 1..={MAX_TIMEOUT_MS}"
                )));
            }
        }
        if self.client_queue_capacity == 0 || self.client_queue_capacity > MAX_CLIENT_QUEUE_CAPACITY
        {
            return Err(Error::InvalidConfig(format!(
                "server.client_queue_capacity must be in 1..={MAX_CLIENT_QUEUE_CAPACITY}"
            )));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
