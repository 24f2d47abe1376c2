//! Argument normalization and validation
//!
//! This module provides the input sanitizer that repairs common argument
//! shape mistakes and the per-tool schema validator that reports whatever
//! the sanitizer could not fix.

pub mod sanitizer;
pub mod schema;

use crate::error::Things5Error;
use serde::{Deserialize, Serialize};

pub use sanitizer::sanitize;
pub use schema::{FieldType, SchemaConstraint, SchemaValidator};

/// Validation result with detailed information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether validation passed
    pub is_valid: bool,
    /// List of validation errors
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-blocking issues)
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    /// Create a successful validation result
    pub fn success() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Build a result from collected errors and warnings
    pub fn from_parts(errors: Vec<ValidationError>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Multi-line report naming each field, what was received and how to fix it
    pub fn report(&self, tool_name: &str) -> String {
        let mut message = format!("Invalid arguments for {tool_name}:\n");
        for error in &self.errors {
            message.push_str(&format!("\n- {}: {}", error.field, error.message));
            if let Some(expected) = &error.expected {
                message.push_str(&format!("\n  Expected: {expected}"));
            }
            message.push_str(&format!(
                "\n  Received: {}",
                error.actual.as_deref().unwrap_or("nothing")
            ));
            if let Some(suggestion) = &error.suggestion {
                message.push_str(&format!("\n  Hint: {suggestion}"));
            }
        }
        message
    }

    /// Convert to Things5Error if validation failed
    pub fn to_error(&self, tool_name: &str) -> Option<Things5Error> {
        let first = self.errors.first()?;
        Some(Things5Error::malformed_argument(
            tool_name,
            first.field.clone(),
            self.report(tool_name),
        ))
    }
}

/// Validation error details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Field that failed validation
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code for machine processing
    pub code: ValidationErrorCode,
    /// Expected value or format
    pub expected: Option<String>,
    /// Actual value that was provided
    pub actual: Option<String>,
    /// Suggested fix
    pub suggestion: Option<String>,
}

/// Validation warning (non-blocking issue)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Field with warning
    pub field: String,
    /// Warning message
    pub message: String,
    /// Warning code
    pub code: ValidationWarningCode,
}

/// Validation error codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// Required field is missing
    MissingRequired,
    /// Invalid data type
    InvalidType,
    /// Value out of valid range
    OutOfRange,
    /// Invalid enum value
    InvalidEnum,
    /// Failed regex pattern
    PatternMismatch,
}

/// Validation warning codes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationWarningCode {
    /// Field not declared by the tool
    UnknownField,
}
