//! Required-subject assessment coverage for enrolled students.

use std::collections::{BTreeSet, HashSet};

use crate::dataset::Dataset;
use crate::model::{SchoolId, SchoolYear, StudentId};
use crate::quality::config::QaConfig;
use crate::quality::engine::QaRule;
use crate::quality::models::{EntityRef, Finding, Severity};

/// Enrolled students should have a result for every required subject in the
/// coverage term.
///
/// Only school years with at least one assessment in the coverage term are
/// checked, so a year whose testing window has not happened yet is silent.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessmentCoverage;

impl QaRule for AssessmentCoverage {
    fn id(&self) -> &'static str {
        "assessment_coverage"
    }

    fn description(&self) -> &'static str {
        "Enrolled students are assessed in every required subject"
    }

    fn evaluate(&self, dataset: &Dataset, config: &QaConfig) -> Vec<Finding> {
        let coverage = &config.coverage;
        let in_term = dataset
            .assessments()
            .iter()
            .filter(|record| record.term == coverage.term);

        let mut assessed_years = HashSet::new();
        let mut assessed: HashSet<(StudentId, SchoolId, SchoolYear, &str)> = HashSet::new();
        for record in in_term {
            assessed_years.insert(record.school_year);
            assessed.insert((
                record.student_id,
                record.school_id,
                record.school_year,
                record.subject.as_str(),
            ));
        }

        let enrolled: BTreeSet<(StudentId, SchoolId, SchoolYear)> = dataset
            .enrollments()
            .iter()
            .filter(|e| assessed_years.contains(&e.school_year))
            .map(|e| (e.student_id, e.school_id, e.school_year))
            .collect();

        enrolled
            .into_iter()
            .filter_map(|(student_id, school_id, school_year)| {
                let missing: Vec<&str> = coverage
                    .subjects
                    .iter()
                    .map(String::as_str)
                    .filter(|subject| {
                        !assessed.contains(&(student_id, school_id, school_year, *subject))
                    })
                    .collect();
                if missing.is_empty() {
                    return None;
                }

                Some(
                    Finding::new(
                        self.id(),
                        Severity::Warning,
                        vec![EntityRef::Student(student_id), EntityRef::School(school_id)],
                        format!(
                            "Student {student_id} has no {} {} result for {}",
                            coverage.term,
                            school_year,
                            missing.join(", ")
                        ),
                    )
                    .with_value("school_year", school_year)
                    .with_value("term", coverage.term.as_str())
                    .with_value("missing_subjects", missing),
                )
            })
            .collect()
    }
}
