//! Students-per-teacher plausibility per school and year.

use crate::dataset::Dataset;
use crate::metrics::{MetricValue, staffing};
use crate::quality::config::QaConfig;
use crate::quality::engine::QaRule;
use crate::quality::models::{EntityRef, Finding, Severity};

use super::round6;

/// Students per teacher FTE per school and year must be plausible.
///
/// Only school years with enrolled students are checked. Teacher FTE counts
/// staffing records whose educator is a teacher on the roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaffingRatio;

impl QaRule for StaffingRatio {
    fn id(&self) -> &'static str {
        "staffing_ratio"
    }

    fn description(&self) -> &'static str {
        "Students per teacher FTE falls within the configured bounds"
    }

    fn evaluate(&self, dataset: &Dataset, config: &QaConfig) -> Vec<Finding> {
        let bounds = config.staffing_ratio;
        let teacher_fte = dataset
            .staffing()
            .iter()
            .filter(|record| {
                dataset
                    .educator(record.educator_id)
                    .is_some_and(|educator| educator.is_teacher())
            })
            .map(|record| (record.school_id, record.school_year, record.fte));
        let enrolled = dataset
            .enrollments()
            .iter()
            .map(|e| (e.student_id, e.school_id, e.school_year));

        staffing::tally(enrolled, teacher_fte)
            .into_iter()
            .filter(|school| school.students > 0)
            .filter_map(|school| {
                let message = match school.students_per_teacher() {
                    MetricValue::Undefined => format!(
                        "School {} has {} enrolled students in {} but no teacher FTE",
                        school.school_id, school.students, school.school_year
                    ),
                    MetricValue::Defined(ratio) if bounds.contains(ratio) => return None,
                    MetricValue::Defined(ratio) => format!(
                        "School {} has {:.1} students per teacher FTE in {}, outside [{}, {}]",
                        school.school_id, ratio, school.school_year, bounds.min, bounds.max
                    ),
                };
                let ratio = school.students_per_teacher().value().map(round6);

                Some(
                    Finding::new(
                        self.id(),
                        Severity::Warning,
                        vec![EntityRef::School(school.school_id)],
                        message,
                    )
                    .with_value("school_year", school.school_year)
                    .with_value("ratio", ratio)
                    .with_value("students", school.students)
                    .with_value("teacher_fte", round6(school.teacher_fte))
                    .with_value("min", bounds.min)
                    .with_value("max", bounds.max),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, SchoolId};
    use crate::quality::config::RatioBounds;
    use crate::quality::rules::test_support::{educator, enroll, staff};

    /// One school, `students` enrolled, one teacher at `fte`.
    fn school_with(students: u64, fte: f64) -> Dataset {
        Dataset::new(
            vec![],
            vec![],
            vec![educator(1, Some("standard"))],
            (0..students).map(|id| enroll(id, 1001, 2025)).collect(),
            vec![staff(1, 1001, 2025, fte, "math")],
            vec![],
        )
    }

    #[test]
    fn test_ratio_within_bounds() {
        assert!(StaffingRatio.evaluate(&school_with(20, 1.0), &QaConfig::default()).is_empty());
    }

    #[test]
    fn test_ratio_above_bounds_is_single_warning() {
        let config = QaConfig::new().with_staffing_ratio(RatioBounds::new(10.0, 25.0));
        let findings = StaffingRatio.evaluate(&school_with(35, 1.0), &config);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.severity, Severity::Warning);
        assert_eq!(finding.entities, vec![EntityRef::School(SchoolId(1001))]);
        assert_eq!(finding.value_f64("ratio"), Some(35.0));
        assert_eq!(finding.value_f64("max"), Some(25.0));
    }

    #[test]
    fn test_no_teacher_fte_reports_null_ratio() {
        let findings = StaffingRatio.evaluate(&school_with(12, 0.0), &QaConfig::default());

        assert_eq!(findings.len(), 1);
        assert!(findings[0].payload["ratio"].is_null());
        assert!(findings[0].message.contains("no teacher FTE"));
    }

    #[test]
    fn test_non_teacher_fte_not_counted() {
        let mut dataset_educator = educator(1, None);
        dataset_educator.role = Role::Admin;
        let ds = Dataset::new(
            vec![],
            vec![],
            vec![dataset_educator],
            (0..20).map(|id| enroll(id, 1001, 2025)).collect(),
            vec![staff(1, 1001, 2025, 1.0, "admin")],
            vec![],
        );
        let findings = StaffingRatio.evaluate(&ds, &QaConfig::default());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].value_f64("teacher_fte"), Some(0.0));
    }
}
