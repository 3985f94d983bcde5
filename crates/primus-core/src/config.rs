//! Configuration for the coordination core.
//!
//! Constants live on `ServerConfig`; the runtime values an engine uses are
//! collected in `EngineConfig`, which starts from those constants and can be
//! overlaid from the environment and from launch flags.

use crate::flags::LaunchFlags;
use crate::{PrimusError, Result};
use std::time::Duration;

/// Server-level constants.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 41_877;
    pub const DEFAULT_TIMEOUT_DELAY: Duration = Duration::from_millis(2000);

    pub const MAX_CONNECTIONS: usize = 64;
    pub const MAX_FRAME_BYTES: u64 = 16 * 1024 * 1024; // 16MB
    pub const READ_BUFFER_CAPACITY: usize = 8 * 1024;

    // Configuration keys
    pub const HOST_KEY: &'static str = "SERVER_HOST";
    pub const PORT_KEY: &'static str = "SERVER_PORT";
    pub const TIMEOUT_DELAY_KEY: &'static str = "SERVER_TIMEOUT_DELAY";

    /// Prefix applied to the keys when read from the environment.
    pub const ENV_PREFIX: &'static str = "PRIMUS_";
}

/// Runtime configuration of one coordination engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// How long to wait for `Accepted`/`Denied` before assuming primary.
    pub timeout_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: ServerConfig::DEFAULT_HOST.to_string(),
            port: ServerConfig::DEFAULT_PORT,
            timeout_delay: ServerConfig::DEFAULT_TIMEOUT_DELAY,
        }
    }
}

impl EngineConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout_delay(mut self, delay: Duration) -> Self {
        self.timeout_delay = delay;
        self
    }

    /// Defaults overlaid with `PRIMUS_SERVER_HOST`, `PRIMUS_SERVER_PORT` and
    /// `PRIMUS_SERVER_TIMEOUT_DELAY` (milliseconds).
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| {
            std::env::var(format!("{}{}", ServerConfig::ENV_PREFIX, key)).ok()
        })
    }

    /// Overlay values from an arbitrary key lookup.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ServerConfig::HOST_KEY) {
            if host.trim().is_empty() {
                return Err(PrimusError::Config {
                    message: format!("{} must not be empty", ServerConfig::HOST_KEY),
                });
            }
            self.host = host.trim().to_string();
        }

        if let Some(port) = lookup(ServerConfig::PORT_KEY) {
            self.port = port.trim().parse().map_err(|e| PrimusError::Config {
                message: format!("Invalid {} {:?}: {}", ServerConfig::PORT_KEY, port, e),
            })?;
        }

        if let Some(delay) = lookup(ServerConfig::TIMEOUT_DELAY_KEY) {
            let millis: u64 = delay.trim().parse().map_err(|e| PrimusError::Config {
                message: format!(
                    "Invalid {} {:?}: {}",
                    ServerConfig::TIMEOUT_DELAY_KEY,
                    delay,
                    e
                ),
            })?;
            self.timeout_delay = Duration::from_millis(millis);
        }

        Ok(self)
    }

    /// Apply `--server-host` / `--server-port` overrides.
    pub fn apply_flags(mut self, flags: &LaunchFlags) -> Self {
        if let Some(host) = &flags.server_host {
            self.host = host.clone();
        }
        if let Some(port) = flags.server_port {
            self.port = port;
        }
        self
    }

    /// `host:port` string used for both listening and connecting.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, ServerConfig::DEFAULT_PORT);
        assert_eq!(config.timeout_delay, Duration::from_millis(2000));
        assert_eq!(config.address(), format!("127.0.0.1:{}", ServerConfig::DEFAULT_PORT));
    }

    #[test]
    fn test_overlay_values() {
        let config = EngineConfig::default()
            .overlay(lookup(&[
                ("SERVER_HOST", "localhost"),
                ("SERVER_PORT", "6000"),
                ("SERVER_TIMEOUT_DELAY", "250"),
            ]))
            .unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6000);
        assert_eq!(config.timeout_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_overlay_rejects_bad_port() {
        let result = EngineConfig::default().overlay(lookup(&[("SERVER_PORT", "99999")]));
        assert!(matches!(result, Err(PrimusError::Config { .. })));
    }

    #[test]
    fn test_flags_override_config() {
        let flags = LaunchFlags::parse(&["--server-host", "::1", "--server-port", "7001"]);
        let config = EngineConfig::default().with_port(1).apply_flags(&flags);
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 7001);
    }

    #[test]
    fn test_limits_are_reasonable() {
        assert!(ServerConfig::MAX_CONNECTIONS > 1);
        assert!(ServerConfig::MAX_FRAME_BYTES > ServerConfig::READ_BUFFER_CAPACITY as u64);
    }
}
