//! Error types and handling for Phlegon
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Phlegon operations
pub type Result<T> = std::result::Result<T, PhlegonError>;

/// Main error type for Phlegon
#[derive(Debug, Error)]
pub enum PhlegonError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Modbus communication errors
    #[error("Modbus error: {message}")]
    Modbus { message: String },

    /// Telemetry that could not be read or decoded; never coerced to a default
    #[error("Telemetry unavailable: {message}")]
    Telemetry { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors (REST status endpoint)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl PhlegonError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        PhlegonError::Config {
            message: message.into(),
        }
    }

    /// Create a new Modbus error
    pub fn modbus<S: Into<String>>(message: S) -> Self {
        PhlegonError::Modbus {
            message: message.into(),
        }
    }

    /// Create a new telemetry-unavailable error
    pub fn telemetry<S: Into<String>>(message: S) -> Self {
        PhlegonError::Telemetry {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        PhlegonError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        PhlegonError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        PhlegonError::Network {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        PhlegonError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        PhlegonError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for PhlegonError {
    fn from(err: std::io::Error) -> Self {
        PhlegonError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for PhlegonError {
    fn from(err: serde_yaml::Error) -> Self {
        PhlegonError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PhlegonError {
    fn from(err: serde_json::Error) -> Self {
        PhlegonError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PhlegonError {
    fn from(err: reqwest::Error) -> Self {
        PhlegonError::network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PhlegonError::config("test config error");
        assert!(matches!(err, PhlegonError::Config { .. }));

        let err = PhlegonError::modbus("test modbus error");
        assert!(matches!(err, PhlegonError::Modbus { .. }));

        let err = PhlegonError::telemetry("empty response");
        assert!(matches!(err, PhlegonError::Telemetry { .. }));

        let err = PhlegonError::validation("field", "test validation error");
        assert!(matches!(err, PhlegonError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = PhlegonError::config("test error");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Configuration error: test error");

        let err = PhlegonError::telemetry("zero-length register response");
        let error_string = format!("{}", err);
        assert_eq!(
            error_string,
            "Telemetry unavailable: zero-length register response"
        );

        let err = PhlegonError::validation("test_field", "invalid value");
        let error_string = format!("{}", err);
        assert_eq!(error_string, "Validation error: test_field - invalid value");
    }
}
