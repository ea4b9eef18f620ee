//! Data quality rules and reporting.
//!
//! This module provides the QA framework run on every load:
//! - **Rules**: independent checks implementing [`QaRule`], registered in a
//!   [`RuleRegistry`] in report order
//! - **Engine**: [`RuleEngine`] evaluates enabled rules sequentially or on
//!   blocking tasks and returns findings in a stable order
//! - **Report**: [`FindingAggregator`] summarizes findings into a
//!   [`QaReport`] and decides whether the pipeline halts
//!
//! Findings are data, not errors: a rule never fails the run, it reports.
//!
//! # Example
//! ```rust,ignore
//! use k12qa_core::quality::{FindingAggregator, HaltPolicy, QaConfig, RuleEngine, RuleRegistry};
//!
//! let config = QaConfig::default();
//! let policy = HaltPolicy::default().with_halt_on_warning(config.halt_on_warning);
//! let engine = RuleEngine::new(RuleRegistry::standard(), config);
//! let findings = engine.evaluate(&dataset);
//! let report = FindingAggregator::new(policy).aggregate(findings, &engine.active_rule_ids(), now);
//! ```

mod config;
mod engine;
mod models;
mod report;
pub mod rules;

// Re-export public API
pub use config::{CertificationPolicy, ConfigValidationError, CoverageConfig, QaConfig, RatioBounds};
pub use engine::{QaRule, RuleEngine, RuleRegistry};
pub use models::{EntityRef, Finding, Severity};
pub use report::{FindingAggregator, HaltPolicy, QaReport, REPORT_FORMAT_VERSION, ReportSummary};
