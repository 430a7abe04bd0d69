//! Configuration structures for mitm-relay.
//!
//! Values come from three layers: compiled defaults, an optional TOML file,
//! and command-line overrides. Later layers win.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Relay endpoints and transport.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Subject of the synthesized certificate.
    #[serde(default)]
    pub tls: TlsSubjectConfig,

    /// Status/control endpoint.
    #[serde(default)]
    pub control: ControlConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay binding and upstream configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host address to bind. Empty binds every interface.
    #[serde(default)]
    pub local_host: String,

    /// Port to listen on for clients.
    #[serde(default)]
    pub local_port: u16,

    /// Upstream server as `host:port`.
    #[serde(default)]
    pub remote_host: String,

    /// Terminate and re-originate TLS on both legs.
    #[serde(default)]
    pub tls: bool,

    /// Base path of the certificate pair (`<base>.pem`, `<base>.key`).
    #[serde(default)]
    pub cert_file: String,

    /// Per-read idle timeout in seconds, 0 disables it.
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

impl RelayConfig {
    /// The address the listener binds.
    pub fn bind_addr(&self) -> String {
        match self.local_host.as_str() {
            "" => format!("0.0.0.0:{}", self.local_port),
            host if host.contains(':') && !host.starts_with('[') => {
                format!("[{}]:{}", host, self.local_port)
            }
            host => format!("{}:{}", host, self.local_port),
        }
    }

    /// Idle timeout, if one is configured.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// Certificate base path, if one is configured.
    pub fn cert_base(&self) -> Option<&str> {
        (!self.cert_file.is_empty()).then_some(self.cert_file.as_str())
    }
}

/// Subject fields for the self-signed certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSubjectConfig {
    #[serde(default = "default_country")]
    pub country: Vec<String>,

    #[serde(default)]
    pub organization: Vec<String>,

    #[serde(default = "default_common_name")]
    pub common_name: String,
}

impl Default for TlsSubjectConfig {
    fn default() -> Self {
        Self {
            country: default_country(),
            organization: Vec::new(),
            common_name: default_common_name(),
        }
    }
}

fn default_country() -> Vec<String> {
    vec!["GB".to_string()]
}

fn default_common_name() -> String {
    "*.domain.com".to_string()
}

/// Status/control HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Serve the endpoint at all.
    #[serde(default = "default_control_enabled")]
    pub enabled: bool,

    #[serde(default = "default_control_host")]
    pub host: String,

    #[serde(default = "default_control_port")]
    pub port: u16,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            enabled: default_control_enabled(),
            host: default_control_host(),
            port: default_control_port(),
        }
    }
}

fn default_control_enabled() -> bool {
    true
}

fn default_control_host() -> String {
    "localhost".to_string()
}

fn default_control_port() -> u16 {
    8080
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for the daily log files.
    #[serde(default = "default_log_directory")]
    pub directory: String,

    /// File name prefix of the daily log files.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Dump relayed traffic to the log.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_file_prefix(),
            verbose: default_verbose(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "./log".to_string()
}

fn default_file_prefix() -> String {
    "dailylog".to_string()
}

fn default_verbose() -> bool {
    true
}

/// Values supplied on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub local_host: Option<String>,
    pub local_port: Option<u16>,
    pub remote_host: Option<String>,
    pub tls: Option<bool>,
    pub cert_file: Option<String>,
    pub idle_timeout_secs: Option<u64>,
    pub control_host: Option<String>,
    pub control_port: Option<u16>,
    pub control_enabled: Option<bool>,
    pub verbose: Option<bool>,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("not a valid config file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Apply command-line overrides on top of this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.local_host {
            self.relay.local_host = host.clone();
        }
        if let Some(port) = overrides.local_port {
            self.relay.local_port = port;
        }
        if let Some(remote) = &overrides.remote_host {
            self.relay.remote_host = remote.clone();
        }
        if let Some(tls) = overrides.tls {
            self.relay.tls = tls;
        }
        if let Some(cert) = &overrides.cert_file {
            self.relay.cert_file = cert.clone();
        }
        if let Some(secs) = overrides.idle_timeout_secs {
            self.relay.idle_timeout_secs = secs;
        }
        if let Some(host) = &overrides.control_host {
            self.control.host = host.clone();
        }
        if let Some(port) = overrides.control_port {
            self.control.port = port;
        }
        if let Some(enabled) = overrides.control_enabled {
            self.control.enabled = enabled;
        }
        if let Some(verbose) = overrides.verbose {
            self.logging.verbose = verbose;
        }
    }

    /// Check the settings the relay cannot start without.
    pub fn validate(&self) -> Result<()> {
        if self.relay.remote_host.trim().is_empty() {
            return Err(Error::Config("remote host required".into()));
        }
        crate::tls::split_host_port(&self.relay.remote_host)?;
        Ok(())
    }
}
