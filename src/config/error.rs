//! Errors raised while loading, validating or saving `duplex-port.toml`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A count or interval that the port cannot run with when zero.
    #[error("[{section}] {key} must be greater than zero")]
    Zero {
        section: &'static str,
        key: &'static str,
    },

    /// A `DUPLEX_PORT_*` override that does not parse.
    #[error("{var}={value:?} is not a valid {expected}")]
    Env {
        var: String,
        value: String,
        expected: &'static str,
    },

    #[error("Configuration was not loaded from a file, there is nowhere to save it")]
    NoFilePath,
}

impl ConfigError {
    pub fn zero(section: &'static str, key: &'static str) -> Self {
        Self::Zero { section, key }
    }

    /// Dotted `section.key` of the offending field, when there is one.
    pub fn field(&self) -> Option<String> {
        match self {
            Self::Zero { section, key } => Some(format!("{section}.{key}")),
            _ => None,
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
