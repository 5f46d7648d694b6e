//! Top-level error type for binary entry points.

use std::fmt;

use crate::config::ConfigError;
use crate::telemetry::TelemetryError;

/// Failures that abort service startup.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(error) => write!(f, "configuration error: {error}"),
            AppError::Telemetry(error) => write!(f, "telemetry error: {error}"),
            AppError::Io(error) => write!(f, "io error: {error}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(error) => Some(error),
            AppError::Telemetry(error) => Some(error),
            AppError::Io(error) => Some(error),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(error: ConfigError) -> Self {
        AppError::Config(error)
    }
}

impl From<TelemetryError> for AppError {
    fn from(error: TelemetryError) -> Self {
        AppError::Telemetry(error)
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        AppError::Io(error)
    }
}
