//! KPI calculation configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{SchoolYear, Term};

/// One assessment administration: a term within a school year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssessmentWindow {
    pub school_year: SchoolYear,
    pub term: Term,
}

impl AssessmentWindow {
    /// Creates a new window.
    pub fn new(school_year: SchoolYear, term: Term) -> Self {
        Self { school_year, term }
    }
}

/// A named program cohort compared between two windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortConfig {
    /// Cohort label, reported as the KPI subgroup
    pub name: String,
    /// Program whose participants form the cohort
    pub program: String,
    /// Baseline window
    pub pre: AssessmentWindow,
    /// Comparison window
    pub post: AssessmentWindow,
}

/// Metric calculation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricConfig {
    /// Terms for which proficiency rates and gaps are reported
    pub terms: Vec<Term>,
    /// Program cohorts for pre/post deltas
    pub cohorts: Vec<CohortConfig>,
}

impl Default for MetricConfig {
    fn default() -> Self {
        Self {
            terms: vec![Term::Spring],
            cohorts: Vec::new(),
        }
    }
}

/// Validation errors for metric configuration.
#[derive(Debug, Error)]
pub enum MetricConfigError {
    #[error("at least one reporting term is required")]
    NoTerms,
    #[error("cohort name must not be empty")]
    EmptyCohortName,
    #[error("cohort '{0}' is defined more than once")]
    DuplicateCohort(String),
    #[error("cohort '{name}' has identical pre and post windows")]
    SameWindow { name: String },
}

impl MetricConfig {
    /// Creates a new metric config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the reporting terms.
    pub fn with_terms(mut self, terms: impl IntoIterator<Item = Term>) -> Self {
        self.terms = terms.into_iter().collect();
        self
    }

    /// Builder method to add a program cohort.
    pub fn with_cohort(mut self, cohort: CohortConfig) -> Self {
        self.cohorts.push(cohort);
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), MetricConfigError> {
        if self.terms.is_empty() {
            return Err(MetricConfigError::NoTerms);
        }
        for (position, cohort) in self.cohorts.iter().enumerate() {
            if cohort.name.trim().is_empty() {
                return Err(MetricConfigError::EmptyCohortName);
            }
            if cohort.pre == cohort.post {
                return Err(MetricConfigError::SameWindow {
                    name: cohort.name.clone(),
                });
            }
            if self.cohorts[..position].iter().any(|c| c.name == cohort.name) {
                return Err(MetricConfigError::DuplicateCohort(cohort.name.clone()));
            }
        }
        Ok(())
    }
}
