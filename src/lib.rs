//! Duplex Port Library
//!
//! A listener-driven communication port over an already-open byte stream,
//! such as a Bluetooth rfcomm socket or a serial-over-USB bridge. Reading
//! happens on a background thread that pushes every chunk to a replaceable
//! listener; writing blocks the caller for at most a configured timeout;
//! closing is safe from any thread, even while I/O is in flight.
//!
//! # Modules
//!
//! - `port`: the port, its reader and writer units, and stream backends
//! - `config`: Configuration management with TOML support
//! - `logging`: tracing subscriber setup
//! - `error`: Unified error type for front ends

pub mod config;
pub mod error;
pub mod logging;
pub mod port;

pub use error::{AppError, AppResult};
pub use port::{
    AsyncStreamPort, ChannelListener, InputStream, Listener, OutputStream, PortError,
    PortSettings, ReaderState, StopReason, StreamPort,
};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
