//! Error types for k12qa operations.
//!
//! Only conditions that make a run untrustworthy are errors: malformed input
//! rows, unreadable files, invalid configuration, and report encoding
//! failures. Data-quality violations are never errors; they are reported as
//! findings by the rule engine.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::metrics::MetricConfigError;
use crate::quality::ConfigValidationError;
use crate::validation::ValidationError;

/// Main error type for k12qa operations.
#[derive(Debug, Error)]
pub enum K12QaError {
    /// A raw input row or field could not be decoded into a typed record
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Quality configuration failed validation
    #[error("Invalid quality configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// Metric configuration failed validation
    #[error("Invalid metric configuration: {0}")]
    InvalidMetricConfig(#[from] MetricConfigError),

    /// I/O operation failed
    #[error("I/O operation failed: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization or deserialization failed
    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Tabular output could not be encoded
    #[error("CSV encoding failed: {context}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    /// The QA report did not match its published schema
    #[error("Report validation failed: {0}")]
    ReportValidation(#[from] ValidationError),
}

/// Convenience type alias for Results with K12QaError
pub type Result<T> = std::result::Result<T, K12QaError>;

impl K12QaError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates an I/O error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a serialization error with context
    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Creates a CSV encoding error with context
    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }

    /// Returns true if this error came from the typed decode boundary.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = K12QaError::configuration("ratio bounds inverted");
        assert!(error.to_string().contains("ratio bounds inverted"));

        let error = K12QaError::io(
            "Failed to read students.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(error.to_string().contains("students.csv"));
        assert!(!error.is_decode());
    }

    #[test]
    fn test_decode_error_passes_through() {
        let decode = DecodeError::new(
            "educators",
            4,
            "years_experience",
            "-2",
            "invalid digit found in string",
        );
        let error = K12QaError::from(decode);

        assert!(error.is_decode());
        let message = error.to_string();
        assert!(message.contains("educators"));
        assert!(message.contains("line 4"));
        assert!(message.contains("years_experience"));
    }
}
