//! District-facing KPIs.
//!
//! Metrics are computed from [`CuratedTables`](crate::curated::CuratedTables)
//! and emitted as flat [`KpiRow`]s:
//! - **Proficiency rate** per school and district, subgroup, subject, and term
//! - **Proficiency gap**: complement rate minus flagged-subgroup rate
//! - **Students per teacher** FTE per school and year
//! - **Pre/post deltas** for configured program cohorts
//!
//! A zero denominator is never a fault and never zero: it produces
//! [`MetricValue::Undefined`], rendered as `undefined`.

mod calculator;
mod config;
pub mod staffing;
mod value;

// Re-export public API
pub use calculator::{
    ALL, KpiRow, KpiScope, MetricCalculator, PRE_POST_MEAN_SCALE_SCORE, PRE_POST_PROFICIENCY_RATE,
    STUDENTS_PER_TEACHER, encode_kpis, proficiency_gap_metric, proficiency_rate_metric,
};
pub use config::{AssessmentWindow, CohortConfig, MetricConfig, MetricConfigError};
pub use value::{MetricValue, UNDEFINED, mean, ratio};
