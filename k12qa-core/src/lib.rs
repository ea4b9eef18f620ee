//! Core record model, data-quality rules, and KPI calculation for k12qa.
//!
//! This crate holds everything the `k12qa` binary runs between reading the
//! input directory and writing outputs:
//! - Typed decode of raw CSV extracts into immutable records
//! - A registry of independent quality rules and a deterministic engine
//! - Aggregation of findings into a schema-validated QA report
//! - Curated dimension/fact tables and district KPIs
//!
//! # Guarantees
//! - Identical input produces byte-identical findings
//! - Data-quality violations are findings, never errors or panics
//! - Zero denominators produce an explicit undefined value
//!
//! # Example
//! ```rust,ignore
//! use k12qa_core::{Dataset, InputConfig, QaConfig, pipeline};
//!
//! let dataset = Dataset::load_dir(Path::new("data/raw"), &InputConfig::default())?;
//! let report = pipeline::run_quality(&dataset, &QaConfig::default(), chrono::Utc::now())?;
//! println!("{} findings", report.summary.total);
//! ```

pub mod config;
pub mod curated;
pub mod dataset;
pub mod decode;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod quality;
pub mod validation;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use curated::CuratedTables;
pub use dataset::Dataset;
pub use decode::{ColumnMapping, DecodeError, DecodeRecord, InputConfig, load_table};
pub use error::{K12QaError, Result};
pub use metrics::{KpiRow, MetricCalculator, MetricConfig, MetricValue};
pub use quality::{
    EntityRef, Finding, FindingAggregator, HaltPolicy, QaConfig, QaReport, QaRule, RuleEngine,
    RuleRegistry, Severity,
};
pub use validation::{
    ValidationError, initialize_report_validator, validate_and_parse_report,
    validate_report_output,
};
