//! Primary-key uniqueness rules.
//!
//! One finding per duplicated identifier, listing every row index (0-based
//! position among data rows) that carries it.

use std::collections::BTreeMap;

use crate::dataset::Dataset;
use crate::quality::config::QaConfig;
use crate::quality::engine::QaRule;
use crate::quality::models::{EntityRef, Finding, Severity};

/// Groups row indices by key and reports keys seen more than once.
fn duplicate_findings<K, I>(
    rule_id: &'static str,
    noun: &str,
    table: &str,
    keys: I,
    entity: impl Fn(K) -> EntityRef,
) -> Vec<Finding>
where
    K: Ord + Copy + std::fmt::Display,
    I: IntoIterator<Item = K>,
{
    let mut rows_by_key: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (row_index, key) in keys.into_iter().enumerate() {
        rows_by_key.entry(key).or_default().push(row_index);
    }

    rows_by_key
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(key, rows)| {
            Finding::new(
                rule_id,
                Severity::Error,
                vec![entity(key)],
                format!(
                    "{noun} id {key} appears {} times in {table}",
                    rows.len()
                ),
            )
            .with_value("table", table)
            .with_value("count", rows.len())
            .with_value("row_indices", rows)
        })
        .collect()
}

/// Educator identifiers must be unique across the roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateEducator;

impl QaRule for DuplicateEducator {
    fn id(&self) -> &'static str {
        "duplicate_educator"
    }

    fn description(&self) -> &'static str {
        "Educator identifiers are unique across the roster"
    }

    fn evaluate(&self, dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
        duplicate_findings(
            self.id(),
            "Educator",
            "educators",
            dataset.educators().iter().map(|e| e.educator_id),
            EntityRef::Educator,
        )
    }
}

/// Student identifiers must be unique.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateStudent;

impl QaRule for DuplicateStudent {
    fn id(&self) -> &'static str {
        "duplicate_student"
    }

    fn description(&self) -> &'static str {
        "Student identifiers are unique"
    }

    fn evaluate(&self, dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
        duplicate_findings(
            self.id(),
            "Student",
            "students",
            dataset.students().iter().map(|s| s.student_id),
            EntityRef::Student,
        )
    }
}

/// School identifiers must be unique.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuplicateSchool;

impl QaRule for DuplicateSchool {
    fn id(&self) -> &'static str {
        "duplicate_school"
    }

    fn description(&self) -> &'static str {
        "School identifiers are unique"
    }

    fn evaluate(&self, dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
        duplicate_findings(
            self.id(),
            "School",
            "schools",
            dataset.schools().iter().map(|s| s.school_id),
            EntityRef::School,
        )
    }
}
