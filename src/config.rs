//! Configuration loading from TOML files and environment variables.
//!
//! Precedence, lowest first: built-in defaults, optional TOML file,
//! environment variables, CLI flags (applied by the binary). The result is an
//! immutable snapshot taken once at startup.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::binding::Binding;
use crate::error::ServerError;
use crate::simulation::parse_int_literal;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub simulation: SimulationDefaults,
    pub fanout: FanoutConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port (`PORT`).
    pub port: u16,

    /// Concurrency binding used to run each simulated request.
    pub binding: Binding,

    /// Compress responses with gzip (`SYN_GZIP`).
    pub gzip: bool,

    /// Graceful shutdown timeout (seconds).
    pub shutdown_timeout_secs: u64,

    /// Encoded records buffered between a worker thread and the client.
    pub stream_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8083,
            binding: Binding::Cooperative,
            gzip: false,
            shutdown_timeout_secs: 30,
            stream_buffer: 16,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid listen address: {}", e)))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Process-wide simulation defaults, used when a request omits a field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationDefaults {
    pub frames: i64,
    pub delay_ms: i64,
    pub bytes_per_frame: i64,
    pub cpu_spin_ms: i64,
    pub fanout: i64,
    pub fanout_delay_ms: i64,
    /// Fan-out calls go to the tool endpoint instead of spinning locally.
    pub fanout_http: bool,
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        Self {
            frames: 200,
            delay_ms: 5,
            bytes_per_frame: 64,
            cpu_spin_ms: 0,
            fanout: 0,
            fanout_delay_ms: 0,
            fanout_http: false,
        }
    }
}

/// Remote fan-out target.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Full URL of the sibling tool endpoint.
    pub tool_url: String,

    /// Per-call timeout (seconds).
    pub timeout_secs: u64,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            tool_url: "http://127.0.0.1:8083/tool".to_string(),
            timeout_secs: 5,
        }
    }
}

impl FanoutConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Metrics/Prometheus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint.
    pub enabled: bool,

    /// Listen address for metrics server.
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn").
    pub level: String,

    /// Output format: "pretty" or "json".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ServerError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ServerError::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from file, then apply environment variable overrides.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ServerError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        Ok(config)
    }

    /// Apply environment variable overrides read through `lookup`.
    ///
    /// A variable that is set but not an integer is an error.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ServerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let int = |key: &str, target: &mut i64| -> Result<(), ServerError> {
            if let Some(v) = lookup(key) {
                *target = parse_int_literal(&v).ok_or_else(|| {
                    ServerError::Config(format!("{} must be an integer, got {:?}", key, v))
                })?;
            }
            Ok(())
        };

        // Simulation defaults
        let sim = &mut self.simulation;
        int("SYN_FRAMES", &mut sim.frames)?;
        int("SYN_DELAY_MS", &mut sim.delay_ms)?;
        int("SYN_BYTES", &mut sim.bytes_per_frame)?;
        int("SYN_CPU_SPIN_MS", &mut sim.cpu_spin_ms)?;
        int("SYN_FANOUT", &mut sim.fanout)?;
        int("SYN_FANOUT_DELAY_MS", &mut sim.fanout_delay_ms)?;
        if let Some(v) = lookup("SYN_FANOUT_HTTP") {
            sim.fanout_http = is_truthy(&v);
        }

        // Server overrides
        if let Some(v) = lookup("PORT") {
            self.server.port = v.trim().parse().map_err(|_| {
                ServerError::Config(format!("PORT must be a port number, got {:?}", v))
            })?;
        }
        if let Some(v) = lookup("SYN_GZIP") {
            self.server.gzip = is_truthy(&v);
        }
        if let Some(v) = lookup("SYN_BINDING") {
            self.server.binding = v.parse().map_err(ServerError::Config)?;
        }

        // Fan-out target
        if let Some(v) = lookup("SYN_TOOL_URL") {
            self.fanout.tool_url = v;
        }

        // Metrics overrides
        if let Some(v) = lookup("SYN_METRICS_ENABLED") {
            self.metrics.enabled = is_truthy(&v);
        }
        if let Some(v) = lookup("SYN_METRICS_ADDR") {
            self.metrics.listen_addr = v;
        }

        // Logging overrides
        if let Some(v) = lookup("SYN_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("SYN_LOG_FORMAT") {
            self.logging.format = v;
        }

        Ok(())
    }
}

/// `"1"` and `"true"` (any case) enable a flag; everything else disables it.
pub fn is_truthy(value: &str) -> bool {
    let v = value.to_ascii_lowercase();
    v == "1" || v == "true"
}
