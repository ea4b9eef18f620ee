//! End-to-end pipeline stages over a loaded dataset.
//!
//! Loading and writing are left to the caller; these functions take a
//! [`Dataset`] and return the QA report, curated tables, and KPI rows.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::PipelineConfig;
use crate::curated::CuratedTables;
use crate::dataset::Dataset;
use crate::error::{K12QaError, Result};
use crate::metrics::{KpiRow, MetricCalculator};
use crate::quality::{FindingAggregator, QaConfig, QaReport, RuleEngine, RuleRegistry};
use crate::validation::validate_report_output;

/// Everything a pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: QaReport,
    pub curated: CuratedTables,
    pub kpis: Vec<KpiRow>,
}

/// Runs the standard rules sequentially and builds a validated report.
pub fn run_quality(
    dataset: &Dataset,
    config: &QaConfig,
    run_timestamp: DateTime<Utc>,
) -> Result<QaReport> {
    let engine = RuleEngine::new(RuleRegistry::standard(), config.clone());
    let findings = engine.evaluate(dataset);
    let report = FindingAggregator::new(config.halt_policy()).aggregate(
        findings,
        &engine.active_rule_ids(),
        run_timestamp,
    );
    validate_report(&report)?;
    Ok(report)
}

/// Checks a report against the published schema.
pub fn validate_report(report: &QaReport) -> Result<()> {
    let value = serde_json::to_value(report)
        .map_err(|e| K12QaError::serialization("Failed to serialize QA report", e))?;
    validate_report_output(&value)?;
    Ok(())
}

/// Runs every stage: concurrent rule evaluation, aggregation, curated
/// tables, and KPIs.
pub async fn run(
    dataset: Arc<Dataset>,
    config: &PipelineConfig,
    run_timestamp: DateTime<Utc>,
) -> Result<PipelineOutput> {
    config.validate()?;

    let engine = RuleEngine::new(RuleRegistry::standard(), config.quality.clone());
    tracing::info!("Evaluating {} quality rules", engine.active_rule_ids().len());
    let findings = engine.evaluate_concurrent(Arc::clone(&dataset)).await;
    let report = FindingAggregator::new(config.quality.halt_policy()).aggregate(
        findings,
        &engine.active_rule_ids(),
        run_timestamp,
    );
    validate_report(&report)?;
    tracing::info!(
        "QA report: {} errors, {} warnings, {} info",
        report.summary.error_count,
        report.summary.warning_count,
        report.summary.info_count
    );

    let curated = CuratedTables::build(&dataset);
    let kpis = MetricCalculator::new(config.metrics.clone()).compute(&curated);
    tracing::info!("Computed {} KPI rows", kpis.len());

    Ok(PipelineOutput {
        report,
        curated,
        kpis,
    })
}
