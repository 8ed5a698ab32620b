//! Port-specific error types.
//!
//! Transport failures are converted into these variants at the reader/writer
//! boundary, so callers never see a panic for a port that is not connected.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The specified device was not found on the system.
    #[error("Device not found: {0}")]
    NotFound(String),

    /// An I/O error occurred on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Port configuration failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The transport did not accept data within the configured bound.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Attempted to attach streams to a port that already has a pair installed.
    #[error("Port already has streams attached")]
    AlreadyAttached,

    /// No writer is installed (not attached yet, or already closed).
    #[error("Port is not attached")]
    NotAttached,

    /// The unit was closed while or before the operation ran.
    #[error("Stream is closed")]
    Closed,

    /// A serialport-specific error occurred.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl PortError {
    /// Create a NotFound error from a device name.
    pub fn not_found(device: impl Into<String>) -> Self {
        Self::NotFound(device.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Whether this error means "nothing to talk to" rather than a transport fault.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::NotAttached | Self::Closed)
    }
}
