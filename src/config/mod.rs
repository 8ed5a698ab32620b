//! Configuration module for duplex-port.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `DUPLEX_PORT_CONFIG` environment variable (explicit path)
//! 2. `./duplex-port.toml` (current directory)
//! 3. `~/.config/duplex-port/config.toml` (XDG on Linux/macOS)
//! 4. `%APPDATA%\duplex-port\config.toml` (Windows)
//! 5. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `DUPLEX_PORT_<SECTION>_<KEY>`:
//! - `DUPLEX_PORT_PORT_WRITE_TIMEOUT_MS=1000`
//! - `DUPLEX_PORT_PORT_READ_BUFFER_SIZE=512`
//! - `DUPLEX_PORT_SERIAL_DEFAULT_BAUD=4800`
//! - `DUPLEX_PORT_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use duplex_port::config::ConfigLoader;
//! use duplex_port::port::StreamPort;
//!
//! let loader = ConfigLoader::load()?;
//! let port = StreamPort::with_settings("nmea", loader.config().port.settings());
//! # Ok::<(), duplex_port::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, PortConfig, SerialConfig};
