//! Error types for the Things5 intent resolution engine
//!
//! This module provides the crate error enum, structured error codes and
//! production-safe messages. Remote failures are normally absorbed by the
//! services (stale cache, empty capability lists); these types surface at
//! configuration time, at the client boundary and in validation reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Things5 operations
pub type Result<T> = std::result::Result<T, Things5Error>;

/// Error types for Things5 MCP operations
#[derive(Error, Debug)]
pub enum Things5Error {
    /// Connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Argument shape that normalization could not repair
    #[error("Invalid argument '{field}' for {tool}: {message}")]
    MalformedArgument {
        tool: String,
        field: String,
        message: String,
    },

    /// Not found errors (organizations, devices, firmware)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Service unavailable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Structured error code for machine-readable error handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1000-1099)
    ConnectionTimeout,
    ConnectionLost,

    // Authentication errors (1100-1199)
    InvalidCredentials,

    // Configuration errors (1200-1299)
    ConfigurationInvalid,

    // Device errors (1300-1399)
    DeviceNotFound,

    // Data errors (1400-1499)
    ParsingFailed,
    InvalidInput,
    ValidationFailed,

    // Service errors (1600-1699)
    ServiceUnavailable,
    ExternalServiceError,

    // Internal errors (1900-1999)
    InternalError,
}

impl ErrorCode {
    /// Get numeric error code
    pub fn as_number(&self) -> u32 {
        match self {
            ErrorCode::ConnectionTimeout => 1001,
            ErrorCode::ConnectionLost => 1003,
            ErrorCode::InvalidCredentials => 1101,
            ErrorCode::ConfigurationInvalid => 1202,
            ErrorCode::DeviceNotFound => 1301,
            ErrorCode::ParsingFailed => 1401,
            ErrorCode::InvalidInput => 1402,
            ErrorCode::ValidationFailed => 1403,
            ErrorCode::ServiceUnavailable => 1601,
            ErrorCode::ExternalServiceError => 1603,
            ErrorCode::InternalError => 1901,
        }
    }

    /// Get error category
    pub fn category(&self) -> &'static str {
        match self.as_number() {
            1000..=1099 => "connection",
            1100..=1199 => "authentication",
            1200..=1299 => "configuration",
            1300..=1399 => "device",
            1400..=1499 => "data",
            1600..=1699 => "service",
            1900..=1999 => "internal",
            _ => "unknown",
        }
    }
}

/// Sanitized error representation for production logging
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedError {
    pub code: ErrorCode,
    pub code_number: u32,
    pub category: &'static str,
    pub message: String,
    pub is_retryable: bool,
    pub is_auth_error: bool,
}

impl Things5Error {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a malformed argument error
    pub fn malformed_argument<T, F, M>(tool: T, field: F, message: M) -> Self
    where
        T: Into<String>,
        F: Into<String>,
        M: Into<String>,
    {
        Self::MalformedArgument {
            tool: tool.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Create a parsing error
    pub fn parsing_error<S: Into<String>>(msg: S) -> Self {
        Self::Parsing(msg.into())
    }

    /// Map Things5Error to structured error code
    pub fn to_error_code(&self) -> ErrorCode {
        match self {
            Things5Error::Connection(_) => ErrorCode::ConnectionLost,
            Things5Error::Authentication(_) => ErrorCode::InvalidCredentials,
            Things5Error::Config(_) => ErrorCode::ConfigurationInvalid,
            Things5Error::Timeout(_) => ErrorCode::ConnectionTimeout,
            Things5Error::InvalidInput(_) => ErrorCode::InvalidInput,
            Things5Error::MalformedArgument { .. } => ErrorCode::ValidationFailed,
            Things5Error::NotFound(_) => ErrorCode::DeviceNotFound,
            Things5Error::ServiceUnavailable(_) => ErrorCode::ServiceUnavailable,
            Things5Error::Parsing(_) | Things5Error::Json(_) => ErrorCode::ParsingFailed,
            Things5Error::Http(_) => ErrorCode::ExternalServiceError,
            Things5Error::Io(_) | Things5Error::Generic(_) => ErrorCode::InternalError,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Things5Error::Connection(_)
                | Things5Error::Timeout(_)
                | Things5Error::ServiceUnavailable(_)
                | Things5Error::Http(_)
        )
    }

    /// Check if error indicates authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Things5Error::Authentication(_))
    }

    /// Get a production-safe error message that doesn't expose sensitive information
    pub fn sanitized_message(&self) -> String {
        #[cfg(debug_assertions)]
        {
            self.to_string()
        }
        #[cfg(not(debug_assertions))]
        {
            match self {
                Things5Error::Authentication(_) => "Authentication failed".to_string(),
                Things5Error::Connection(_) => "Network connection issue".to_string(),
                Things5Error::Timeout(_) => "Operation timed out".to_string(),
                Things5Error::Http(_) => "HTTP request failed".to_string(),
                Things5Error::Config(_) => "Configuration error".to_string(),
                // Validation reports carry no secrets and are meant for the caller
                Things5Error::InvalidInput(_) | Things5Error::MalformedArgument { .. } => {
                    self.to_string()
                }
                Things5Error::NotFound(_) => "Requested resource not found".to_string(),
                Things5Error::ServiceUnavailable(_) => {
                    "Service temporarily unavailable".to_string()
                }
                Things5Error::Parsing(_) | Things5Error::Json(_) => {
                    "Data parsing error".to_string()
                }
                Things5Error::Io(_) => "I/O operation failed".to_string(),
                Things5Error::Generic(_) => "Internal error occurred".to_string(),
            }
        }
    }

    /// Create a sanitized version of the error for logging
    pub fn sanitized_error(&self) -> SanitizedError {
        let code = self.to_error_code();
        SanitizedError {
            code,
            code_number: code.as_number(),
            category: code.category(),
            message: self.sanitized_message(),
            is_retryable: self.is_retryable(),
            is_auth_error: self.is_auth_error(),
        }
    }
}

impl From<regex::Error> for Things5Error {
    fn from(err: regex::Error) -> Self {
        Things5Error::Config(format!("Invalid regex: {err}"))
    }
}

impl From<toml::de::Error> for Things5Error {
    fn from(err: toml::de::Error) -> Self {
        Things5Error::Config(format!("Invalid TOML: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_and_categories() {
        let err = Things5Error::not_found("device 42");
        assert_eq!(err.to_error_code(), ErrorCode::DeviceNotFound);
        assert_eq!(err.to_error_code().category(), "device");

        let err = Things5Error::malformed_argument("metrics_read", "metric_names", "expected array");
        assert_eq!(err.to_error_code().as_number(), 1403);
        assert_eq!(err.to_error_code().category(), "data");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Things5Error::timeout("inventory").is_retryable());
        assert!(Things5Error::service_unavailable("502").is_retryable());
        assert!(!Things5Error::invalid_input("bad").is_retryable());
        assert!(Things5Error::authentication("expired").is_auth_error());
    }

    #[test]
    fn test_sanitized_error_keeps_validation_details() {
        let err = Things5Error::malformed_argument("metrics_read", "metric_names", "wrap in an array");
        let sanitized = err.sanitized_error();
        assert!(sanitized.message.contains("metric_names"));
        assert!(!sanitized.is_retryable);
    }
}
