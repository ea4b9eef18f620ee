//! Enrollment integrity rules.

use std::collections::{BTreeMap, BTreeSet};

use crate::dataset::Dataset;
use crate::model::{SchoolId, SchoolYear, StudentId};
use crate::quality::config::QaConfig;
use crate::quality::engine::QaRule;
use crate::quality::models::{EntityRef, Finding, Severity};

/// Every assessed (student, school, year) must be an enrollment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollmentConsistency;

impl QaRule for EnrollmentConsistency {
    fn id(&self) -> &'static str {
        "enrollment_consistency"
    }

    fn description(&self) -> &'static str {
        "Assessments reference an enrollment for the same student, school, and year"
    }

    fn evaluate(&self, dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
        let mut unmatched: BTreeMap<(StudentId, SchoolId, SchoolYear), usize> = BTreeMap::new();
        for record in dataset.assessments() {
            if !dataset.is_enrolled(record.student_id, record.school_id, record.school_year) {
                *unmatched
                    .entry((record.student_id, record.school_id, record.school_year))
                    .or_default() += 1;
            }
        }
        if unmatched.is_empty() {
            return Vec::new();
        }

        let mut enrolled_at: BTreeMap<(StudentId, SchoolYear), BTreeSet<SchoolId>> =
            BTreeMap::new();
        for enrollment in dataset.enrollments() {
            enrolled_at
                .entry((enrollment.student_id, enrollment.school_year))
                .or_default()
                .insert(enrollment.school_id);
        }

        unmatched
            .into_iter()
            .map(|((student_id, school_id, school_year), assessment_count)| {
                let enrolled_school_ids: Vec<u64> = enrolled_at
                    .get(&(student_id, school_year))
                    .map(|schools| schools.iter().map(|id| id.0).collect())
                    .unwrap_or_default();
                Finding::new(
                    self.id(),
                    Severity::Error,
                    vec![EntityRef::Student(student_id), EntityRef::School(school_id)],
                    format!(
                        "Student {student_id} was assessed at school {school_id} in {school_year} without an enrollment there"
                    ),
                )
                .with_value("school_year", school_year)
                .with_value("assessment_count", assessment_count)
                .with_value("enrolled_school_ids", enrolled_school_ids)
            })
            .collect()
    }
}

/// Enrollment rows must reference known students and schools.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrollmentReference;

impl QaRule for EnrollmentReference {
    fn id(&self) -> &'static str {
        "enrollment_reference"
    }

    fn description(&self) -> &'static str {
        "Enrollments reference students and schools that exist"
    }

    fn evaluate(&self, dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
        dataset
            .enrollments()
            .iter()
            .enumerate()
            .filter_map(|(row_index, enrollment)| {
                let mut missing = Vec::new();
                if dataset.student(enrollment.student_id).is_none() {
                    missing.push("student");
                }
                if dataset.school(enrollment.school_id).is_none() {
                    missing.push("school");
                }
                if missing.is_empty() {
                    return None;
                }

                Some(
                    Finding::new(
                        self.id(),
                        Severity::Error,
                        vec![
                            EntityRef::Student(enrollment.student_id),
                            EntityRef::School(enrollment.school_id),
                        ],
                        format!(
                            "Enrollment of student {} at school {} references unknown {}",
                            enrollment.student_id,
                            enrollment.school_id,
                            missing.join(" and ")
                        ),
                    )
                    .with_value("school_year", enrollment.school_year)
                    .with_value("row_index", row_index)
                    .with_value("missing", missing),
                )
            })
            .collect()
    }
}
