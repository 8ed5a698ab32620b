//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "DUPLEX_PORT";

/// Config file name looked up in the working directory
const LOCAL_CONFIG_FILE_NAME: &str = "duplex-port.toml";

/// Config file name inside the per-user config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Application directory under the per-user config directory
const APP_DIR_NAME: &str = "duplex-port";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "DUPLEX_PORT_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `DUPLEX_PORT_CONFIG` environment variable (explicit path)
    /// 2. `./duplex-port.toml` (current directory)
    /// 3. `$XDG_CONFIG_HOME/duplex-port/config.toml`, `%APPDATA%` on Windows
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to the file it was loaded from.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self
            .config_path
            .as_ref()
            .ok_or_else(|| ConfigError::NoFilePath)?;

        save_to_file(&self.config, path)
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }

    /// Reload configuration from file (if path is set).
    pub fn reload(&mut self) -> ConfigResult<()> {
        if let Some(ref path) = self.config_path {
            let mut config = load_from_file(path)?;
            apply_env_overrides(&mut config)?;
            config.validate()?;
            self.config = config;
        }
        Ok(())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    get_default_config_path().filter(|path| path.exists())
}

/// Get the platform-specific config directory.
fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse `DUPLEX_PORT_<suffix>` into `target` if it is set.
fn override_from_env<T: FromStr>(
    suffix: &str,
    target: &mut T,
    expected: &'static str,
) -> ConfigResult<()> {
    let var = format!("{}_{}", ENV_PREFIX, suffix);
    if let Ok(value) = std::env::var(&var) {
        *target = match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                return Err(ConfigError::Env {
                    var,
                    value,
                    expected,
                })
            }
        };
    }
    Ok(())
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern `DUPLEX_PORT_<SECTION>_<KEY>`,
/// e.g. `DUPLEX_PORT_PORT_WRITE_TIMEOUT_MS=1000`.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    override_from_env(
        "PORT_WRITE_TIMEOUT_MS",
        &mut config.port.write_timeout_ms,
        "timeout",
    )?;
    override_from_env(
        "PORT_READ_BUFFER_SIZE",
        &mut config.port.read_buffer_size,
        "buffer size",
    )?;

    override_from_env(
        "SERIAL_DEFAULT_BAUD",
        &mut config.serial.default_baud,
        "baud rate",
    )?;
    override_from_env(
        "SERIAL_POLL_INTERVAL_MS",
        &mut config.serial.poll_interval_ms,
        "poll interval",
    )?;

    if let Ok(val) = std::env::var(format!("{}_LOGGING_LEVEL", ENV_PREFIX)) {
        config.logging.level = val;
    }
    override_from_env::<LogFormat>("LOGGING_FORMAT", &mut config.logging.format, "log format")?;

    Ok(())
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(APP_DIR_NAME))
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}
