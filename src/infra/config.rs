//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/relay.toml
//!
//! After the file is loaded, `PORT` and `POLL_INTERVAL_MS` environment
//! variables override the listening port and the dashboard poll period.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on reading a request body
    #[serde(default = "default_server_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Largest accepted POST body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8050
}

fn default_server_request_timeout_ms() -> u64 {
    5000
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            request_timeout_ms: default_server_request_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Full URL of the query endpoint
    #[serde(default = "default_metrics_url")]
    pub url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_client_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Threshold shown when the record carries none
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

fn default_metrics_url() -> String {
    "http://127.0.0.1:8050/metrics".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_client_request_timeout_ms() -> u64 {
    2000
}

fn default_threshold() -> f64 {
    crate::domain::record::DEFAULT_THRESHOLD
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            url: default_metrics_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_client_request_timeout_ms(),
            default_threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Full URL of the ingest endpoint
    #[serde(default = "default_metrics_url")]
    pub url: String,
    #[serde(default = "default_simulator_interval_secs")]
    pub interval_secs: u64,
}

fn default_simulator_interval_secs() -> u64 {
    3
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { url: default_metrics_url(), interval_secs: default_simulator_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    /// Period of the self-metrics log line (0 to disable)
    #[serde(default = "default_stats_interval_secs")]
    pub interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    10
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { interval_secs: default_stats_interval_secs() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    bind_address: String,
    port: u16,
    server_request_timeout_ms: u64,
    max_body_bytes: usize,
    dashboard_url: String,
    poll_interval_ms: u64,
    dashboard_request_timeout_ms: u64,
    default_threshold: f64,
    simulator_url: String,
    simulator_interval_secs: u64,
    stats_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            bind_address: toml_config.server.bind_address,
            port: toml_config.server.port,
            server_request_timeout_ms: toml_config.server.request_timeout_ms,
            max_body_bytes: toml_config.server.max_body_bytes,
            dashboard_url: toml_config.dashboard.url,
            poll_interval_ms: toml_config.dashboard.poll_interval_ms,
            dashboard_request_timeout_ms: toml_config.dashboard.request_timeout_ms,
            default_threshold: toml_config.dashboard.default_threshold,
            simulator_url: toml_config.simulator.url,
            simulator_interval_secs: toml_config.simulator.interval_secs,
            stats_interval_secs: toml_config.stats.interval_secs,
            config_file,
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults.
    /// Environment overrides are applied either way.
    pub fn load_from_path(path: &str) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        };
        config.with_env_overrides(|key| env::var(key).ok())
    }

    /// Apply `PORT` and `POLL_INTERVAL_MS` from the given lookup.
    ///
    /// Values that do not parse are ignored with a warning.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => warn!(value = %raw, "invalid_port_override"),
            }
        }
        if let Some(raw) = lookup("POLL_INTERVAL_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.poll_interval_ms = ms,
                _ => warn!(value = %raw, "invalid_poll_interval_override"),
            }
        }
        self
    }

    // Getters for all config fields
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn server_request_timeout_ms(&self) -> u64 {
        self.server_request_timeout_ms
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    pub fn dashboard_url(&self) -> &str {
        &self.dashboard_url
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn dashboard_request_timeout_ms(&self) -> u64 {
        self.dashboard_request_timeout_ms
    }

    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    pub fn simulator_url(&self) -> &str {
        &self.simulator_url
    }

    pub fn simulator_interval_secs(&self) -> u64 {
        self.simulator_interval_secs
    }

    pub fn stats_interval_secs(&self) -> u64 {
        self.stats_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and CLI flags to set the listening port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method for CLI flags to point the dashboard elsewhere
    pub fn with_dashboard_url(mut self, url: impl Into<String>) -> Self {
        self.dashboard_url = url.into();
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "0.0.0.0");
        assert_eq!(config.port(), 8050);
        assert_eq!(config.server_request_timeout_ms(), 5000);
        assert_eq!(config.max_body_bytes(), 65536);
        assert_eq!(config.dashboard_url(), "http://127.0.0.1:8050/metrics");
        assert_eq!(config.poll_interval_ms(), 1000);
        assert_eq!(config.dashboard_request_timeout_ms(), 2000);
        assert_eq!(config.default_threshold(), 0.5);
        assert_eq!(config.simulator_interval_secs(), 3);
        assert_eq!(config.stats_interval_secs(), 10);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            ("PORT".to_string(), "9000".to_string()),
            ("POLL_INTERVAL_MS".to_string(), "3000".to_string()),
        ]);
        let config = Config::default().with_env_overrides(|key| env.get(key).cloned());
        assert_eq!(config.port(), 9000);
        assert_eq!(config.poll_interval_ms(), 3000);
    }

    #[test]
    fn test_invalid_env_overrides_ignored() {
        let env = HashMap::from([
            ("PORT".to_string(), "not-a-port".to_string()),
            ("POLL_INTERVAL_MS".to_string(), "0".to_string()),
        ]);
        let config = Config::default().with_env_overrides(|key| env.get(key).cloned());
        assert_eq!(config.port(), 8050);
        assert_eq!(config.poll_interval_ms(), 1000);
    }

    #[test]
    fn test_partial_toml_keeps_section_defaults() {
        let toml_config: TomlConfig = toml::from_str("[server]\nport = 9100\n").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        assert_eq!(config.port(), 9100);
        assert_eq!(config.bind_address(), "0.0.0.0");
        assert_eq!(config.poll_interval_ms(), 1000);
    }
}
