//! Quality rule configuration.
//!
//! Every tunable a rule reads (certification allow-lists, FTE limits,
//! staffing ratio bounds, coverage expectations, halt policy) lives here and
//! is passed explicitly into the rule engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Term;

use super::report::HaltPolicy;

/// Certifications accepted for teachers, per subject area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificationPolicy {
    /// Allowed certifications for subjects without an override
    pub default_allowed: Vec<String>,
    /// Per-subject allow-lists, keyed by lowercase subject area
    pub by_subject: BTreeMap<String, Vec<String>>,
}

impl Default for CertificationPolicy {
    fn default() -> Self {
        Self {
            default_allowed: vec!["standard".to_string(), "provisional".to_string()],
            by_subject: BTreeMap::new(),
        }
    }
}

impl CertificationPolicy {
    /// Builder method to set the allow-list for one subject area.
    pub fn with_subject<I, S>(mut self, subject: impl Into<String>, allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.by_subject.insert(
            subject.into().to_ascii_lowercase(),
            allowed.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Allowed certifications for `subject_area`.
    pub fn allowed_for(&self, subject_area: &str) -> &[String] {
        self.by_subject
            .get(subject_area)
            .unwrap_or(&self.default_allowed)
    }

    /// Returns true if `certification` is allowed for `subject_area`.
    pub fn permits(&self, subject_area: &str, certification: &str) -> bool {
        self.allowed_for(subject_area)
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(certification.trim()))
    }
}

/// Plausible students-per-teacher range (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBounds {
    /// Lowest plausible ratio
    pub min: f64,
    /// Highest plausible ratio
    pub max: f64,
}

impl Default for RatioBounds {
    fn default() -> Self {
        Self {
            min: 10.0,
            max: 35.0,
        }
    }
}

impl RatioBounds {
    /// Creates new bounds.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns true if `ratio` lies within the bounds.
    pub fn contains(&self, ratio: f64) -> bool {
        (self.min..=self.max).contains(&ratio)
    }
}

/// Expected assessment coverage for enrolled students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Term in which every enrolled student should be assessed
    pub term: Term,
    /// Subjects every enrolled student should have a result for
    pub subjects: Vec<String>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            term: Term::Spring,
            subjects: vec!["ela".to_string(), "math".to_string()],
        }
    }
}

/// Quality rule configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Teacher certification allow-lists
    pub certification: CertificationPolicy,
    /// Maximum total FTE per educator per school year
    pub fte_limit: f64,
    /// Slack added to `fte_limit` before flagging
    pub fte_tolerance: f64,
    /// Plausible students-per-teacher bounds
    pub staffing_ratio: RatioBounds,
    /// Assessment coverage expectations
    pub coverage: CoverageConfig,
    /// Halt the pipeline on warnings as well as errors
    pub halt_on_warning: bool,
    /// Rule ids to skip
    pub disabled_rules: Vec<String>,
}

/// Validation errors for quality configuration.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("fte_limit must be a positive finite number, got {0}")]
    InvalidFteLimit(f64),
    #[error("fte_tolerance must be a non-negative finite number, got {0}")]
    InvalidFteTolerance(f64),
    #[error("staffing ratio bounds must satisfy 0 <= min <= max, got [{min}, {max}]")]
    InvalidRatioBounds { min: f64, max: f64 },
    #[error("coverage subjects must not be empty")]
    EmptyCoverageSubjects,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            certification: CertificationPolicy::default(),
            fte_limit: 1.0,
            fte_tolerance: 1e-5,
            staffing_ratio: RatioBounds::default(),
            coverage: CoverageConfig::default(),
            halt_on_warning: false,
            disabled_rules: Vec::new(),
        }
    }
}

impl QaConfig {
    /// Creates a new quality config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the certification policy.
    pub fn with_certification(mut self, policy: CertificationPolicy) -> Self {
        self.certification = policy;
        self
    }

    /// Builder method to set the FTE tolerance.
    pub fn with_fte_tolerance(mut self, tolerance: f64) -> Self {
        if tolerance < 0.0 {
            tracing::warn!("fte_tolerance {} clamped to 0.0", tolerance);
        }
        self.fte_tolerance = tolerance.max(0.0);
        self
    }

    /// Builder method to set the staffing ratio bounds.
    pub fn with_staffing_ratio(mut self, bounds: RatioBounds) -> Self {
        self.staffing_ratio = bounds;
        self
    }

    /// Builder method to set coverage expectations.
    pub fn with_coverage(mut self, coverage: CoverageConfig) -> Self {
        self.coverage = coverage;
        self
    }

    /// Builder method to halt on warnings as well as errors.
    pub fn with_halt_on_warning(mut self, halt: bool) -> Self {
        self.halt_on_warning = halt;
        self
    }

    /// Builder method to disable a rule by id.
    pub fn with_disabled_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.disabled_rules.push(rule_id.into());
        self
    }

    /// Halt policy implied by this configuration.
    pub fn halt_policy(&self) -> HaltPolicy {
        HaltPolicy::default().with_halt_on_warning(self.halt_on_warning)
    }

    /// Returns true if the rule with `rule_id` should run.
    pub fn is_enabled(&self, rule_id: &str) -> bool {
        !self.disabled_rules.iter().any(|id| id == rule_id)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.fte_limit.is_finite() || self.fte_limit <= 0.0 {
            return Err(ConfigValidationError::InvalidFteLimit(self.fte_limit));
        }
        if !self.fte_tolerance.is_finite() || self.fte_tolerance < 0.0 {
            return Err(ConfigValidationError::InvalidFteTolerance(
                self.fte_tolerance,
            ));
        }
        let RatioBounds { min, max } = self.staffing_ratio;
        if !min.is_finite() || !max.is_finite() || min < 0.0 || min > max {
            return Err(ConfigValidationError::InvalidRatioBounds { min, max });
        }
        if self.coverage.subjects.is_empty() {
            return Err(ConfigValidationError::EmptyCoverageSubjects);
        }
        Ok(())
    }
}
