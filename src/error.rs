use crate::config::ConfigError;
use crate::port::PortError;
use std::fmt;

/// A specialized `Result` type for the monitor binary and other top-level callers.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error type.
///
/// The library itself reports through `PortError` and `ConfigError`; this
/// type only gathers them for front ends.
#[derive(Debug)]
pub enum AppError {
    Port(PortError),
    Config(ConfigError),
    InvalidArgs(String),
    IoError(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port(e) => write!(f, "Port error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::InvalidArgs(details) => write!(f, "Invalid arguments: {details}"),
            Self::IoError(e) => write!(f, "An I/O error occurred: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Port(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::InvalidArgs(_) => None,
            Self::IoError(e) => Some(e),
        }
    }
}

// Implement `From` conversions to allow the `?` operator to work seamlessly.
impl From<PortError> for AppError {
    fn from(err: PortError) -> Self {
        AppError::Port(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display_and_source() {
        let err: AppError = PortError::NotAttached.into();
        assert_eq!(err.to_string(), "Port error: Port is not attached");
        assert!(err.source().is_some());

        let err = AppError::InvalidArgs("no transport".to_string());
        assert_eq!(err.to_string(), "Invalid arguments: no transport");
        assert!(err.source().is_none());
    }
}
