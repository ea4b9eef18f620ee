//! KPI calculation over curated tables.
//!
//! Every ratio or average goes through [`ratio`], so an empty population
//! yields [`MetricValue::Undefined`] instead of zero or a fault.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::curated::{CuratedTables, FctAssessment, TableRow, encode_csv};
use crate::error::Result;
use crate::model::{SchoolId, SchoolYear, Subgroup, Term};

use super::config::{AssessmentWindow, CohortConfig, MetricConfig};
use super::staffing;
use super::value::{MetricValue, mean, ratio};

/// Label for the whole population or all subjects.
pub const ALL: &str = "all";

/// Metric name for students per teacher FTE.
pub const STUDENTS_PER_TEACHER: &str = "students_per_teacher";
/// Metric name for the cohort change in mean scale score.
pub const PRE_POST_MEAN_SCALE_SCORE: &str = "pre_post_delta.mean_scale_score";
/// Metric name for the cohort change in proficiency rate.
pub const PRE_POST_PROFICIENCY_RATE: &str = "pre_post_delta.proficiency_rate";

/// Metric name for the proficiency rate in `term`.
pub fn proficiency_rate_metric(term: Term) -> String {
    format!("proficiency_rate.{term}")
}

/// Metric name for the subgroup proficiency gap in `term`.
pub fn proficiency_gap_metric(term: Term) -> String {
    format!("proficiency_gap.{term}")
}

/// A school, or the whole district.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KpiScope {
    All,
    School(SchoolId),
}

impl fmt::Display for KpiScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(ALL),
            Self::School(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for KpiScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str(ALL),
            Self::School(id) => serializer.serialize_u64(id.0),
        }
    }
}

/// One KPI table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiRow {
    pub school_id: KpiScope,
    pub school_year: SchoolYear,
    pub subgroup: String,
    pub subject: String,
    pub metric_name: String,
    pub value: MetricValue,
}

impl TableRow for KpiRow {
    const COLUMNS: &'static [&'static str] = &[
        "school_id",
        "school_year",
        "subgroup",
        "subject",
        "metric_name",
        "value",
    ];
}

impl KpiRow {
    fn new(
        school_id: KpiScope,
        school_year: SchoolYear,
        subgroup: impl Into<String>,
        subject: impl Into<String>,
        metric_name: impl Into<String>,
        value: MetricValue,
    ) -> Self {
        Self {
            school_id,
            school_year,
            subgroup: subgroup.into(),
            subject: subject.into(),
            metric_name: metric_name.into(),
            value,
        }
    }
}

/// Encodes KPI rows as CSV.
pub fn encode_kpis(rows: &[KpiRow]) -> Result<Vec<u8>> {
    encode_csv("kpis", rows)
}

#[derive(Debug, Clone, Copy, Default)]
struct ProficiencyTally {
    proficient: usize,
    tested: usize,
}

impl ProficiencyTally {
    fn add(&mut self, proficient: bool) {
        self.tested += 1;
        if proficient {
            self.proficient += 1;
        }
    }

    fn rate(&self) -> MetricValue {
        ratio(self.proficient as f64, self.tested as f64)
    }
}

/// Proficiency tallies for the whole population and each partition.
///
/// Results for students missing from the roster count only toward `all`.
#[derive(Debug, Default)]
struct SubgroupTallies {
    all: ProficiencyTally,
    flagged: [ProficiencyTally; 3],
    complement: [ProficiencyTally; 3],
}

impl SubgroupTallies {
    fn add(&mut self, record: &FctAssessment) {
        self.all.add(record.proficient_flag);
        let (Some(frpl), Some(ell), Some(iep)) = (record.frpl_flag, record.ell_flag, record.iep_flag)
        else {
            return;
        };
        for (position, subgroup) in Subgroup::ALL.iter().enumerate() {
            if subgroup.includes(frpl, ell, iep) {
                self.flagged[position].add(record.proficient_flag);
            } else {
                self.complement[position].add(record.proficient_flag);
            }
        }
    }
}

fn in_subject<'a>(
    records: &'a [&'a FctAssessment],
    subject: &'a str,
) -> impl Iterator<Item = &'a FctAssessment> + 'a {
    records
        .iter()
        .copied()
        .filter(move |r| subject == ALL || r.subject == subject)
}

fn mean_score(records: &[&FctAssessment], subject: &str) -> MetricValue {
    mean(in_subject(records, subject).map(|r| r.scale_score))
}

fn proficiency_rate(records: &[&FctAssessment], subject: &str) -> MetricValue {
    let mut tally = ProficiencyTally::default();
    for record in in_subject(records, subject) {
        tally.add(record.proficient_flag);
    }
    tally.rate()
}

/// Computes the KPI table from curated tables.
#[derive(Debug, Clone, Default)]
pub struct MetricCalculator {
    config: MetricConfig,
}

impl MetricCalculator {
    /// Creates a new calculator.
    pub fn new(config: MetricConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the calculator configuration.
    pub fn config(&self) -> &MetricConfig {
        &self.config
    }

    /// Computes every KPI.
    ///
    /// Rows are ordered: proficiency rates and gaps, staffing ratios, then
    /// cohort deltas; each section is ordered by its keys.
    pub fn compute(&self, tables: &CuratedTables) -> Vec<KpiRow> {
        let mut rows = self.proficiency(tables);
        rows.extend(self.students_per_teacher(tables));
        for cohort in &self.config.cohorts {
            rows.extend(self.pre_post_delta(tables, cohort));
        }
        tracing::debug!("Computed {} KPI rows", rows.len());
        rows
    }

    /// Proficiency rates per subgroup and gaps per flagged subgroup.
    pub fn proficiency(&self, tables: &CuratedTables) -> Vec<KpiRow> {
        let terms: BTreeSet<Term> = self.config.terms.iter().copied().collect();
        let mut groups: BTreeMap<(KpiScope, SchoolYear, Term, &str), SubgroupTallies> =
            BTreeMap::new();

        for record in tables
            .fct_assessment
            .iter()
            .filter(|record| terms.contains(&record.term))
        {
            let scopes = [KpiScope::All, KpiScope::School(record.school_id)];
            for scope in scopes {
                let subjects: &[&str] = if record.subject == ALL {
                    &[ALL]
                } else {
                    &[ALL, record.subject.as_str()]
                };
                for &subject in subjects {
                    groups
                        .entry((scope, record.school_year, record.term, subject))
                        .or_default()
                        .add(record);
                }
            }
        }

        let mut rows = Vec::new();
        for ((scope, school_year, term, subject), tallies) in groups {
            let rate_metric = proficiency_rate_metric(term);
            let gap_metric = proficiency_gap_metric(term);

            rows.push(KpiRow::new(
                scope,
                school_year,
                ALL,
                subject,
                rate_metric.clone(),
                tallies.all.rate(),
            ));
            for (position, subgroup) in Subgroup::ALL.iter().enumerate() {
                let flagged = tallies.flagged[position].rate();
                let complement = tallies.complement[position].rate();
                rows.push(KpiRow::new(
                    scope,
                    school_year,
                    subgroup.label(),
                    subject,
                    rate_metric.clone(),
                    flagged,
                ));
                rows.push(KpiRow::new(
                    scope,
                    school_year,
                    subgroup.complement_label(),
                    subject,
                    rate_metric.clone(),
                    complement,
                ));
                rows.push(KpiRow::new(
                    scope,
                    school_year,
                    subgroup.label(),
                    subject,
                    gap_metric.clone(),
                    complement.minus(flagged),
                ));
            }
        }
        rows
    }

    /// Students per teacher FTE per school and year.
    pub fn students_per_teacher(&self, tables: &CuratedTables) -> Vec<KpiRow> {
        let enrolled = tables
            .bridge_student_school
            .iter()
            .map(|b| (b.student_id, b.school_id, b.school_year));
        let teacher_fte = tables
            .fct_staffing
            .iter()
            .filter(|s| s.is_teacher)
            .map(|s| (s.school_id, s.school_year, s.fte));

        staffing::tally(enrolled, teacher_fte)
            .into_iter()
            .map(|school| {
                KpiRow::new(
                    KpiScope::School(school.school_id),
                    school.school_year,
                    ALL,
                    ALL,
                    STUDENTS_PER_TEACHER,
                    school.students_per_teacher(),
                )
            })
            .collect()
    }

    /// Post minus pre mean scale score and proficiency rate for a cohort,
    /// per subject and across subjects.
    ///
    /// Every cohort member's results in each window are included; members
    /// need not be tested in both windows.
    pub fn pre_post_delta(&self, tables: &CuratedTables, cohort: &CohortConfig) -> Vec<KpiRow> {
        let members: HashSet<_> = tables
            .bridge_student_program
            .iter()
            .filter(|p| p.program == cohort.program)
            .map(|p| p.student_id)
            .collect();
        if members.is_empty() {
            tracing::warn!(
                "Cohort '{}' has no participants in program '{}'",
                cohort.name,
                cohort.program
            );
        }

        let window_rows = |window: AssessmentWindow| -> Vec<&FctAssessment> {
            tables
                .fct_assessment
                .iter()
                .filter(|r| {
                    r.school_year == window.school_year
                        && r.term == window.term
                        && members.contains(&r.student_id)
                })
                .collect()
        };
        let pre = window_rows(cohort.pre);
        let post = window_rows(cohort.post);

        let mut subjects: BTreeSet<&str> = BTreeSet::from([ALL]);
        subjects.extend(pre.iter().chain(&post).map(|r| r.subject.as_str()));

        let mut rows = Vec::new();
        for subject in subjects {
            let score_delta = mean_score(&post, subject).minus(mean_score(&pre, subject));
            let rate_delta = proficiency_rate(&post, subject).minus(proficiency_rate(&pre, subject));
            rows.push(KpiRow::new(
                KpiScope::All,
                cohort.post.school_year,
                cohort.name.as_str(),
                subject,
                PRE_POST_MEAN_SCALE_SCORE,
                score_delta,
            ));
            rows.push(KpiRow::new(
                KpiScope::All,
                cohort.post.school_year,
                cohort.name.as_str(),
                subject,
                PRE_POST_PROFICIENCY_RATE,
                rate_delta,
            ));
        }
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curated::{BridgeStudentProgram, BridgeStudentSchool, FctStaffing};
    use crate::model::{EducatorId, StudentId};

    fn result(student: u64, school: u64, subject: &str, proficient: bool, frpl: bool) -> FctAssessment {
        FctAssessment {
            student_id: StudentId(student),
            school_id: SchoolId(school),
            school_year: 2025,
            term: Term::Spring,
            subject: subject.to_string(),
            scale_score: if proficient { 500.0 } else { 400.0 },
            proficient_flag: proficient,
            frpl_flag: Some(frpl),
            ell_flag: Some(false),
            iep_flag: Some(false),
        }
    }

    fn find<'a>(rows: &'a [KpiRow], scope: KpiScope, subgroup: &str, subject: &str, metric: &str) -> &'a KpiRow {
        rows.iter()
            .find(|r| r.school_id == scope && r.subgroup == subgroup && r.subject == subject && r.metric_name == metric)
            .unwrap()
    }

    #[test]
    fn test_combined_subject_counts_each_result_once() {
        let tables = CuratedTables {
            fct_assessment: vec![
                result(1, 1001, ALL, true, false),
                result(1, 1001, "math", false, false),
            ],
            ..CuratedTables::default()
        };
        let rows = MetricCalculator::default().proficiency(&tables);

        let combined = find(&rows, KpiScope::All, "all", ALL, "proficiency_rate.spring");
        assert_eq!(combined.value, MetricValue::Defined(0.5));
        let math = find(&rows, KpiScope::All, "all", "math", "proficiency_rate.spring");
        assert_eq!(math.value, MetricValue::Defined(0.0));
    }

    #[test]
    fn test_subgroup_rates_and_gap() {
        let tables = CuratedTables {
            fct_assessment: vec![
                result(1, 1001, "math", false, true),
                result(2, 1001, "math", true, true),
                result(3, 1001, "math", true, false),
                result(4, 1002, "math", true, false),
            ],
            ..CuratedTables::default()
        };
        let rows = MetricCalculator::default().proficiency(&tables);

        let all = find(&rows, KpiScope::All, "all", "math", "proficiency_rate.spring");
        assert_eq!(all.value, MetricValue::Defined(0.75));
        let frpl = find(&rows, KpiScope::All, "frpl", "math", "proficiency_rate.spring");
        assert_eq!(frpl.value, MetricValue::Defined(0.5));
        let gap = find(&rows, KpiScope::All, "frpl", "math", "proficiency_gap.spring");
        assert_eq!(gap.value, MetricValue::Defined(0.5));
        let school = find(&rows, KpiScope::School(SchoolId(1002)), "non_frpl", "all", "proficiency_rate.spring");
        assert_eq!(school.value, MetricValue::Defined(1.0));
    }

    #[test]
    fn test_empty_subgroup_is_undefined() {
        let tables = CuratedTables {
            fct_assessment: vec![result(1, 1001, "ela", true, false)],
            ..CuratedTables::default()
        };
        let rows = MetricCalculator::default().proficiency(&tables);

        let iep = find(&rows, KpiScope::All, "iep", "ela", "proficiency_rate.spring");
        assert_eq!(iep.value, MetricValue::Undefined);
        let gap = find(&rows, KpiScope::All, "iep", "ela", "proficiency_gap.spring");
        assert_eq!(gap.value, MetricValue::Undefined);
    }

    #[test]
    fn test_unconfigured_terms_skipped() {
        let mut fall = result(1, 1001, "ela", true, false);
        fall.term = Term::Fall;
        let tables = CuratedTables {
            fct_assessment: vec![fall],
            ..CuratedTables::default()
        };
        assert!(MetricCalculator::default().proficiency(&tables).is_empty());

        let calculator = MetricCalculator::new(MetricConfig::new().with_terms([Term::Fall]));
        let rows = calculator.proficiency(&tables);
        assert!(rows.iter().all(|r| r.metric_name.ends_with(".fall")));
    }

    #[test]
    fn test_students_per_teacher_rows() {
        let tables = CuratedTables {
            bridge_student_school: (1..=31)
                .map(|id| BridgeStudentSchool {
                    student_id: StudentId(id),
                    school_id: SchoolId(if id <= 30 { 1001 } else { 1002 }),
                    school_year: 2025,
                })
                .collect(),
            fct_staffing: vec![
                FctStaffing {
                    school_id: SchoolId(1001),
                    educator_id: EducatorId(1),
                    school_year: 2025,
                    fte: 1.5,
                    subject_area: "math".to_string(),
                    role: None,
                    is_teacher: true,
                },
                FctStaffing {
                    school_id: SchoolId(1002),
                    educator_id: EducatorId(2),
                    school_year: 2025,
                    fte: 1.0,
                    subject_area: "admin".to_string(),
                    role: None,
                    is_teacher: false,
                },
            ],
            ..CuratedTables::default()
        };
        let rows = MetricCalculator::default().students_per_teacher(&tables);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].value, MetricValue::Defined(20.0));
        assert_eq!(rows[1].school_id, KpiScope::School(SchoolId(1002)));
        assert_eq!(rows[1].value, MetricValue::Undefined);
    }

    #[test]
    fn test_pre_post_delta() {
        let mut pre_a = result(1, 1001, "math", false, false);
        pre_a.school_year = 2024;
        let mut pre_b = result(2, 1001, "math", true, false);
        pre_b.school_year = 2024;
        let tables = CuratedTables {
            fct_assessment: vec![
                pre_a,
                pre_b,
                result(1, 1001, "math", true, false),
                result(2, 1001, "math", true, false),
                result(3, 1001, "math", false, false),
            ],
            bridge_student_program: vec![
                BridgeStudentProgram {
                    student_id: StudentId(1),
                    program: "tutoring".to_string(),
                },
                BridgeStudentProgram {
                    student_id: StudentId(2),
                    program: "tutoring".to_string(),
                },
            ],
            ..CuratedTables::default()
        };
        let cohort = CohortConfig {
            name: "tutoring_2025".to_string(),
            program: "tutoring".to_string(),
            pre: AssessmentWindow::new(2024, Term::Spring),
            post: AssessmentWindow::new(2025, Term::Spring),
        };
        let rows = MetricCalculator::default().pre_post_delta(&tables, &cohort);

        assert_eq!(rows.len(), 4);
        let score = find(&rows, KpiScope::All, "tutoring_2025", "math", PRE_POST_MEAN_SCALE_SCORE);
        assert_eq!(score.value, MetricValue::Defined(50.0));
        assert_eq!(score.school_year, 2025);
        let rate = find(&rows, KpiScope::All, "tutoring_2025", "all", PRE_POST_PROFICIENCY_RATE);
        assert_eq!(rate.value, MetricValue::Defined(0.5));
    }

    #[test]
    fn test_empty_cohort_is_undefined() {
        let cohort = CohortConfig {
            name: "mentoring".to_string(),
            program: "mentoring".to_string(),
            pre: AssessmentWindow::new(2024, Term::Spring),
            post: AssessmentWindow::new(2025, Term::Spring),
        };
        let rows = MetricCalculator::default().pre_post_delta(&CuratedTables::default(), &cohort);

        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.value == MetricValue::Undefined));
    }

    #[test]
    fn test_kpi_csv() {
        let rows = vec![
            KpiRow::new(KpiScope::All, 2025, ALL, "math", "proficiency_rate.spring", MetricValue::Defined(0.5)),
            KpiRow::new(KpiScope::School(SchoolId(1001)), 2025, "iep", "math", "proficiency_rate.spring", MetricValue::Undefined),
        ];
        let text = String::from_utf8(encode_kpis(&rows).unwrap()).unwrap();
        assert_eq!(
            text,
            "school_id,school_year,subgroup,subject,metric_name,value\n\
             all,2025,all,math,proficiency_rate.spring,0.5\n\
             1001,2025,iep,math,proficiency_rate.spring,undefined\n"
        );
    }
}
