//! Teacher certification against the allowed list for each subject area.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::dataset::Dataset;
use crate::model::{EducatorId, SchoolId, SchoolYear};
use crate::quality::config::QaConfig;
use crate::quality::engine::QaRule;
use crate::quality::models::{EntityRef, Finding, Severity};

/// Teachers must hold a certification allowed for the subject they staff.
///
/// Reported once per (educator, school year, subject area), listing every
/// school the assignment covers. Staffing that references an educator not on
/// the roster is reported here as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeacherCertification;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Issue {
    UnknownEducator,
    Missing,
    NotAllowed(String),
}

impl QaRule for TeacherCertification {
    fn id(&self) -> &'static str {
        "teacher_certification"
    }

    fn description(&self) -> &'static str {
        "Teachers hold a certification allowed for their subject area"
    }

    fn evaluate(&self, dataset: &Dataset, config: &QaConfig) -> Vec<Finding> {
        let policy = &config.certification;
        let mut issues: BTreeMap<(EducatorId, SchoolYear, &str), (Issue, BTreeSet<SchoolId>)> =
            BTreeMap::new();

        for record in dataset.staffing() {
            let issue = match dataset.educator(record.educator_id) {
                None => Issue::UnknownEducator,
                Some(educator) if !educator.is_teacher() => continue,
                Some(educator) => match educator.certification.as_deref() {
                    None => Issue::Missing,
                    Some(cert) if policy.permits(&record.subject_area, cert) => continue,
                    Some(cert) => Issue::NotAllowed(cert.to_string()),
                },
            };

            issues
                .entry((record.educator_id, record.school_year, &record.subject_area))
                .or_insert_with(|| (issue, BTreeSet::new()))
                .1
                .insert(record.school_id);
        }

        issues
            .into_iter()
            .map(|((educator_id, school_year, subject_area), (issue, schools))| {
                let mut entities = vec![EntityRef::Educator(educator_id)];
                entities.extend(schools.iter().copied().map(EntityRef::School));

                let (message, certification) = match issue {
                    Issue::UnknownEducator => (
                        format!(
                            "Staffing for {subject_area} in {school_year} references educator {educator_id}, who is not on the roster"
                        ),
                        Value::Null,
                    ),
                    Issue::Missing => (
                        format!(
                            "Teacher {educator_id} has no certification but is staffed for {subject_area} in {school_year}"
                        ),
                        Value::Null,
                    ),
                    Issue::NotAllowed(cert) => (
                        format!(
                            "Teacher {educator_id} holds certification '{cert}', which is not allowed for {subject_area} in {school_year}"
                        ),
                        Value::from(cert),
                    ),
                };

                Finding::new(self.id(), Severity::Error, entities, message)
                    .with_value("school_year", school_year)
                    .with_value("subject_area", subject_area)
                    .with_value("certification", certification)
                    .with_value("allowed", policy.allowed_for(subject_area).to_vec())
                    .with_value(
                        "school_ids",
                        schools.iter().map(|id| id.0).collect::<Vec<_>>(),
                    )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Educator, Role};
    use crate::quality::config::CertificationPolicy;
    use crate::quality::rules::test_support::{educator, staff};

    fn dataset(educators: Vec<Educator>, staffing: Vec<crate::model::StaffingRecord>) -> Dataset {
        Dataset::new(vec![], vec![], educators, vec![], staffing, vec![])
    }

    #[test]
    fn test_certified_teacher_passes() {
        let ds = dataset(
            vec![educator(1, Some("standard")), educator(2, Some("Provisional"))],
            vec![staff(1, 1001, 2025, 1.0, "math"), staff(2, 1001, 2025, 1.0, "ela")],
        );
        assert!(TeacherCertification.evaluate(&ds, &QaConfig::default()).is_empty());
    }

    #[test]
    fn test_missing_certification_flagged_once_across_schools() {
        let ds = dataset(
            vec![educator(1, None)],
            vec![
                staff(1, 1002, 2025, 0.5, "math"),
                staff(1, 1001, 2025, 0.5, "math"),
            ],
        );
        let findings = TeacherCertification.evaluate(&ds, &QaConfig::default());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].payload["certification"], Value::Null);
        assert_eq!(findings[0].payload["school_ids"], serde_json::json!([1001, 1002]));
        assert_eq!(
            findings[0].entities,
            vec![
                EntityRef::Educator(EducatorId(1)),
                EntityRef::School(SchoolId(1001)),
                EntityRef::School(SchoolId(1002)),
            ]
        );
    }

    #[test]
    fn test_subject_override() {
        let config = QaConfig::new().with_certification(
            CertificationPolicy::default().with_subject("sped", ["special_education"]),
        );
        let ds = dataset(
            vec![educator(1, Some("standard"))],
            vec![staff(1, 1001, 2025, 1.0, "sped"), staff(1, 1001, 2025, 0.0, "math")],
        );
        let findings = TeacherCertification.evaluate(&ds, &config);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].payload["subject_area"], "sped");
        assert_eq!(findings[0].payload["certification"], "standard");
    }

    #[test]
    fn test_non_teachers_ignored() {
        let mut counselor = educator(1, None);
        counselor.role = Role::Counselor;
        let ds = dataset(vec![counselor], vec![staff(1, 1001, 2025, 1.0, "counseling")]);
        assert!(TeacherCertification.evaluate(&ds, &QaConfig::default()).is_empty());
    }

    #[test]
    fn test_unknown_educator_is_a_finding() {
        let ds = dataset(vec![], vec![staff(77, 1001, 2025, 1.0, "math")]);
        let findings = TeacherCertification.evaluate(&ds, &QaConfig::default());

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(findings[0].message.contains("not on the roster"));
    }
}
