//! Finding aggregation into the QA report.
//!
//! The [`FindingAggregator`] summarizes findings per severity and per rule
//! and applies the [`HaltPolicy`]. Findings are carried through verbatim,
//! re-sorted into rule order. The run id is a v5 UUID over the report
//! content, so identical input and timestamp give an identical report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{K12QaError, Result};

use super::models::{Finding, Severity, sort_by_rule_order};

/// Current version of the report format.
pub const REPORT_FORMAT_VERSION: &str = "1.0";

/// Decides whether a report halts the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltPolicy {
    /// Halt on warnings as well as errors
    pub halt_on_warning: bool,
}

impl HaltPolicy {
    /// Halt on errors only.
    pub fn errors_only() -> Self {
        Self::default()
    }

    /// Builder method to also halt on warnings.
    pub fn with_halt_on_warning(mut self, halt: bool) -> Self {
        self.halt_on_warning = halt;
        self
    }

    /// Applies the policy to a summary.
    pub fn should_halt(&self, summary: &ReportSummary) -> bool {
        summary.error_count > 0 || (self.halt_on_warning && summary.warning_count > 0)
    }
}

/// Finding counts for a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    /// Findings per evaluated rule, including rules with none
    pub by_rule: BTreeMap<String, usize>,
}

/// Structured QA report for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub format_version: String,
    pub run_id: Uuid,
    pub run_timestamp: DateTime<Utc>,
    pub summary: ReportSummary,
    pub should_halt: bool,
    pub findings: Vec<Finding>,
}

impl QaReport {
    /// Serializes the report as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| K12QaError::serialization("Failed to serialize QA report", e))
    }

    /// Findings with the given severity.
    pub fn findings_with(&self, severity: Severity) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(move |f| f.severity == severity)
    }
}

/// Builds [`QaReport`]s from rule findings.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindingAggregator {
    policy: HaltPolicy,
}

impl FindingAggregator {
    /// Creates a new aggregator.
    pub fn new(policy: HaltPolicy) -> Self {
        Self { policy }
    }

    /// Returns the halt policy.
    pub fn policy(&self) -> HaltPolicy {
        self.policy
    }

    /// Aggregates findings into a report.
    ///
    /// `rule_ids` lists every rule that was evaluated, in report order, so
    /// that rules without findings still appear in `summary.by_rule`. The
    /// timestamp is supplied by the caller so reports are reproducible.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        mut findings: Vec<Finding>,
        rule_ids: &[S],
        run_timestamp: DateTime<Utc>,
    ) -> QaReport {
        sort_by_rule_order(&mut findings, rule_ids);

        let mut summary = ReportSummary {
            total: findings.len(),
            by_rule: rule_ids
                .iter()
                .map(|id| (id.as_ref().to_string(), 0))
                .collect(),
            ..ReportSummary::default()
        };

        for finding in &findings {
            match finding.severity {
                Severity::Error => summary.error_count += 1,
                Severity::Warning => summary.warning_count += 1,
                Severity::Info => summary.info_count += 1,
            }
            *summary.by_rule.entry(finding.rule_id.clone()).or_default() += 1;
        }

        let should_halt = self.policy.should_halt(&summary);
        if should_halt {
            tracing::warn!(
                "QA report halts the pipeline: {} errors, {} warnings",
                summary.error_count,
                summary.warning_count
            );
        }

        QaReport {
            format_version: REPORT_FORMAT_VERSION.to_string(),
            run_id: self.run_id(rule_ids, run_timestamp, &findings),
            run_timestamp,
            summary,
            should_halt,
            findings,
        }
    }

    fn run_id<S: AsRef<str>>(
        &self,
        rule_ids: &[S],
        run_timestamp: DateTime<Utc>,
        findings: &[Finding],
    ) -> Uuid {
        let mut name = format!(
            "{REPORT_FORMAT_VERSION}\n{}\n{}\n",
            run_timestamp.to_rfc3339(),
            self.policy.halt_on_warning
        );
        for id in rule_ids {
            name.push_str(id.as_ref());
            name.push('\n');
        }
        name.push_str(&serde_json::to_string(findings).unwrap_or_default());
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}
