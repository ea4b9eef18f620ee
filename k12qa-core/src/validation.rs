//! JSON Schema validation for the QA report format.
//!
//! The report is checked against an embedded schema before it is written so
//! that downstream consumers can rely on its shape.
//!
//! # Example
//! ```rust,ignore
//! use k12qa_core::validation::validate_report_output;
//!
//! let json_value = serde_json::to_value(&report)?;
//! validate_report_output(&json_value)?;
//! ```

use std::sync::OnceLock;

use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

use crate::quality::QaReport;

/// JSON Schema validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Schema compilation failed during initialization
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// Validation failed with specific field errors
    #[error("Report validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        error_count: usize,
        errors: Vec<String>,
    },

    /// Unsupported format version detected
    #[error("Unsupported format version '{version}'. Supported versions: {supported:?}")]
    UnsupportedVersion {
        version: String,
        supported: Vec<String>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

/// Supported report format versions
const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Embedded JSON Schema for the v1.0 report
const REPORT_SCHEMA_V1_0: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "k12qa QA Report Format v1.0",
  "type": "object",
  "required": ["format_version", "run_id", "run_timestamp", "summary", "should_halt", "findings"],
  "properties": {
    "format_version": { "type": "string", "pattern": "^1\\.0$" },
    "run_id": { "type": "string", "minLength": 1 },
    "run_timestamp": { "type": "string", "format": "date-time" },
    "summary": {
      "type": "object",
      "required": ["total", "error_count", "warning_count", "info_count", "by_rule"],
      "properties": {
        "total": { "type": "integer", "minimum": 0 },
        "error_count": { "type": "integer", "minimum": 0 },
        "warning_count": { "type": "integer", "minimum": 0 },
        "info_count": { "type": "integer", "minimum": 0 },
        "by_rule": {
          "type": "object",
          "additionalProperties": { "type": "integer", "minimum": 0 }
        }
      }
    },
    "should_halt": { "type": "boolean" },
    "findings": {
      "type": "array",
      "items": { "$ref": "#/$defs/finding" }
    }
  },
  "$defs": {
    "finding": {
      "type": "object",
      "required": ["rule_id", "severity", "entities", "message", "payload"],
      "properties": {
        "rule_id": { "type": "string", "minLength": 1 },
        "severity": { "enum": ["info", "warning", "error"] },
        "entities": {
          "type": "array",
          "items": {
            "type": "object",
            "required": ["kind", "id"],
            "properties": {
              "kind": { "enum": ["school", "student", "educator"] },
              "id": { "type": "integer", "minimum": 0 }
            }
          }
        },
        "message": { "type": "string" },
        "payload": { "type": "object" }
      }
    }
  }
}"##;

/// Compiled JSON Schema instance (initialized once)
static COMPILED_SCHEMA: OnceLock<Validator> = OnceLock::new();

/// Initialize and compile the report schema.
///
/// Safe to call more than once; the first compiled validator is kept.
///
/// # Errors
/// Returns `ValidationError::SchemaCompilation` if the embedded schema is invalid.
pub fn initialize_report_validator() -> Result<(), ValidationError> {
    if COMPILED_SCHEMA.get().is_some() {
        return Ok(());
    }

    let schema_json = report_schema_definition()?;
    let compiled = jsonschema::validator_for(&schema_json).map_err(|e| {
        ValidationError::SchemaCompilation {
            message: format!("Schema compilation error: {e}"),
        }
    })?;

    let _ = COMPILED_SCHEMA.set(compiled);
    Ok(())
}

/// Validate a QA report JSON value against the report schema.
///
/// Compiles the schema on first use. Every schema violation is collected
/// into the returned error.
pub fn validate_report_output(json_value: &Value) -> Result<(), ValidationError> {
    initialize_report_validator()?;
    let schema = COMPILED_SCHEMA
        .get()
        .ok_or_else(|| ValidationError::SchemaCompilation {
            message: "Report validator not initialized".to_string(),
        })?;

    validate_format_version(json_value)?;

    let errors: Vec<String> = schema
        .iter_errors(json_value)
        .map(|error| error.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            error_count: errors.len(),
            errors,
        });
    }

    validate_summary_consistency(json_value)
}

/// Checks that `format_version` is present and supported.
fn validate_format_version(json_value: &Value) -> Result<(), ValidationError> {
    let version = json_value
        .get("format_version")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::ValidationFailed {
            error_count: 1,
            errors: vec!["Missing required field 'format_version'".to_string()],
        })?;

    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(ValidationError::UnsupportedVersion {
            version: version.to_string(),
            supported: SUPPORTED_VERSIONS.iter().map(ToString::to_string).collect(),
        });
    }

    Ok(())
}

/// Summary totals must agree with the findings list.
fn validate_summary_consistency(json_value: &Value) -> Result<(), ValidationError> {
    let findings = json_value
        .get("findings")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let total = json_value
        .pointer("/summary/total")
        .and_then(Value::as_u64)
        .unwrap_or_default();

    if usize::try_from(total).ok() != Some(findings) {
        return Err(ValidationError::ValidationFailed {
            error_count: 1,
            errors: vec![format!(
                "summary.total is {total} but the report has {findings} findings"
            )],
        });
    }
    Ok(())
}

/// Parse, validate, and deserialize a QA report.
pub fn validate_and_parse_report(json_str: &str) -> Result<QaReport, ValidationError> {
    let json_value: Value = serde_json::from_str(json_str)?;
    validate_report_output(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

/// The embedded report schema as a JSON value.
pub fn report_schema_definition() -> Result<Value, ValidationError> {
    serde_json::from_str(REPORT_SCHEMA_V1_0).map_err(|e| ValidationError::SchemaCompilation {
        message: format!("Failed to parse embedded schema: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::model::EducatorId;
    use crate::quality::{EntityRef, Finding, FindingAggregator, Severity};

    fn report_json() -> Value {
        let findings = vec![
            Finding::new(
                "duplicate_educator",
                Severity::Error,
                vec![EntityRef::Educator(EducatorId(3_000_001))],
                "Educator id 3000001 appears 2 times in educators",
            )
            .with_value("row_indices", vec![0, 4]),
        ];
        let report = FindingAggregator::default().aggregate(
            findings,
            &["duplicate_educator"],
            Utc.with_ymd_and_hms(2025, 6, 30, 0, 0, 0).unwrap(),
        );
        serde_json::to_value(&report).unwrap()
    }

    #[test]
    fn test_schema_definition_parses() {
        let schema = report_schema_definition().unwrap();
        assert_eq!(schema["title"], "k12qa QA Report Format v1.0");
        assert!(initialize_report_validator().is_ok());
    }

    #[test]
    fn test_generated_report_is_valid() {
        assert!(validate_report_output(&report_json()).is_ok());
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut value = report_json();
        value["format_version"] = json!("2.0");
        assert!(matches!(
            validate_report_output(&value),
            Err(ValidationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_bad_severity_rejected() {
        let mut value = report_json();
        value["findings"][0]["severity"] = json!("fatal");
        assert!(matches!(
            validate_report_output(&value),
            Err(ValidationError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_total_mismatch_rejected() {
        let mut value = report_json();
        value["summary"]["total"] = json!(7);
        let err = validate_report_output(&value).unwrap_err();
        assert!(err.to_string().contains("summary.total is 7"));
    }

    #[test]
    fn test_round_trip_parse() {
        let json_str = serde_json::to_string(&report_json()).unwrap();
        let report = validate_and_parse_report(&json_str).unwrap();
        assert_eq!(report.summary.error_count, 1);
        assert!(report.should_halt);
    }
}
