//! Configuration schema definitions.
//!
//! All sections use `#[serde(default)]`, so a config file only needs the
//! keys it wants to change.

use super::error::{ConfigError, ConfigResult};
use crate::port::{PortConfiguration, PortSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reader/writer settings applied to every attached stream pair
    pub port: PortConfig,
    /// Serial device defaults
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the port cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port.read_buffer_size == 0 {
            return Err(ConfigError::zero("port", "read_buffer_size"));
        }
        if self.serial.default_baud == 0 {
            return Err(ConfigError::zero("serial", "default_baud"));
        }
        if self.serial.poll_interval_ms == 0 {
            return Err(ConfigError::zero("serial", "poll_interval_ms"));
        }
        Ok(())
    }
}

/// `[port]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Bound for each write/drain call in milliseconds; 0 blocks
    pub write_timeout_ms: u64,
    /// Bytes requested per blocking read
    pub read_buffer_size: usize,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 5000,
            read_buffer_size: 256,
        }
    }
}

impl PortConfig {
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    pub fn settings(&self) -> PortSettings {
        PortSettings {
            write_timeout: self.write_timeout(),
            read_buffer_size: self.read_buffer_size,
        }
    }
}

/// `[serial]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate used when none is given explicitly
    pub default_baud: u32,
    /// How long each tty read waits before re-checking for close
    pub poll_interval_ms: u64,
    /// Short names for device paths
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            default_baud: 115200,
            poll_interval_ms: 50,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolve a device name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Line parameters for opening a device, optionally overriding the baud rate.
    pub fn configuration(&self, baud_rate: Option<u32>) -> PortConfiguration {
        PortConfiguration {
            baud_rate: baud_rate.unwrap_or(self.default_baud),
            poll_interval: self.poll_interval(),
            ..PortConfiguration::default()
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive: "trace", "debug", "info", "warn", "error", or a full
    /// `EnvFilter` expression
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human oriented
    #[default]
    Pretty,
    /// One line per event
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}
