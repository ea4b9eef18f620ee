//! Curated dimension, fact, and bridge tables.
//!
//! Built once from a [`Dataset`] as new immutable collections. Dimensions
//! keep the first row per identifier and are ordered by identifier; facts
//! and bridges keep every row in input order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::dataset::Dataset;
use crate::error::{K12QaError, Result};
use crate::model::{
    DistrictId, EducatorId, Role, SchoolId, SchoolLevel, SchoolYear, StudentId, Term, Urbanicity,
};

/// A row type with a fixed column layout.
pub trait TableRow: Serialize {
    /// Header columns, in field order.
    const COLUMNS: &'static [&'static str];
}

/// Encodes rows as CSV with a header line, even when there are no rows.
pub fn encode_csv<T: TableRow>(table: &str, rows: &[T]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(T::COLUMNS)
        .map_err(|e| K12QaError::csv(format!("Failed to write {table} header"), e))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| K12QaError::csv(format!("Failed to encode {table} row"), e))?;
    }
    writer
        .into_inner()
        .map_err(|e| K12QaError::io(format!("Failed to flush {table}"), e.into_error()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimSchool {
    pub school_id: SchoolId,
    pub district_id: DistrictId,
    pub school_name: Option<String>,
    pub school_level: SchoolLevel,
    pub urbanicity: Urbanicity,
}

impl TableRow for DimSchool {
    const COLUMNS: &'static [&'static str] =
        &["school_id", "district_id", "school_name", "school_level", "urbanicity"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimStudent {
    pub student_id: StudentId,
    pub grade_level: u8,
    pub frpl_flag: bool,
    pub ell_flag: bool,
    pub iep_flag: bool,
}

impl TableRow for DimStudent {
    const COLUMNS: &'static [&'static str] =
        &["student_id", "grade_level", "frpl_flag", "ell_flag", "iep_flag"];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimEducator {
    pub educator_id: EducatorId,
    pub role: Role,
    pub certification: Option<String>,
    pub years_experience: u32,
    pub hire_year: SchoolYear,
    pub is_teacher: bool,
}

impl TableRow for DimEducator {
    const COLUMNS: &'static [&'static str] = &[
        "educator_id",
        "role",
        "certification",
        "years_experience",
        "hire_year",
        "is_teacher",
    ];
}

/// Staffing assignment joined with the educator's role.
///
/// `role` is empty when the educator is not on the roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FctStaffing {
    pub school_id: SchoolId,
    pub educator_id: EducatorId,
    pub school_year: SchoolYear,
    pub fte: f64,
    pub subject_area: String,
    pub role: Option<Role>,
    pub is_teacher: bool,
}

impl TableRow for FctStaffing {
    const COLUMNS: &'static [&'static str] = &[
        "school_id",
        "educator_id",
        "school_year",
        "fte",
        "subject_area",
        "role",
        "is_teacher",
    ];
}

/// Assessment result joined with the student's subgroup flags.
///
/// Flags are empty when the student is not on the roster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FctAssessment {
    pub student_id: StudentId,
    pub school_id: SchoolId,
    pub school_year: SchoolYear,
    pub term: Term,
    pub subject: String,
    pub scale_score: f64,
    pub proficient_flag: bool,
    pub frpl_flag: Option<bool>,
    pub ell_flag: Option<bool>,
    pub iep_flag: Option<bool>,
}

impl TableRow for FctAssessment {
    const COLUMNS: &'static [&'static str] = &[
        "student_id",
        "school_id",
        "school_year",
        "term",
        "subject",
        "scale_score",
        "proficient_flag",
        "frpl_flag",
        "ell_flag",
        "iep_flag",
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStudentSchool {
    pub student_id: StudentId,
    pub school_id: SchoolId,
    pub school_year: SchoolYear,
}

impl TableRow for BridgeStudentSchool {
    const COLUMNS: &'static [&'static str] = &["student_id", "school_id", "school_year"];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeStudentProgram {
    pub student_id: StudentId,
    pub program: String,
}

impl TableRow for BridgeStudentProgram {
    const COLUMNS: &'static [&'static str] = &["student_id", "program"];
}

/// The curated table set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CuratedTables {
    pub dim_school: Vec<DimSchool>,
    pub dim_student: Vec<DimStudent>,
    pub dim_educator: Vec<DimEducator>,
    pub fct_staffing: Vec<FctStaffing>,
    pub fct_assessment: Vec<FctAssessment>,
    pub bridge_student_school: Vec<BridgeStudentSchool>,
    pub bridge_student_program: Vec<BridgeStudentProgram>,
}

/// First row per key, ordered by key.
fn dimension<T, K: Ord, R>(rows: &[T], key: impl Fn(&T) -> K, build: impl Fn(&T) -> R) -> Vec<R> {
    let mut first: BTreeMap<K, &T> = BTreeMap::new();
    for row in rows {
        first.entry(key(row)).or_insert(row);
    }
    first.into_values().map(build).collect()
}

impl CuratedTables {
    /// Builds every curated table from a dataset.
    pub fn build(dataset: &Dataset) -> Self {
        let dim_school = dimension(dataset.schools(), |s| s.school_id, |s| DimSchool {
            school_id: s.school_id,
            district_id: s.district_id,
            school_name: s.school_name.clone(),
            school_level: s.school_level,
            urbanicity: s.urbanicity,
        });
        let dim_student = dimension(dataset.students(), |s| s.student_id, |s| DimStudent {
            student_id: s.student_id,
            grade_level: s.grade_level,
            frpl_flag: s.frpl,
            ell_flag: s.ell,
            iep_flag: s.iep,
        });
        let dim_educator = dimension(dataset.educators(), |e| e.educator_id, |e| DimEducator {
            educator_id: e.educator_id,
            role: e.role,
            certification: e.certification.clone(),
            years_experience: e.years_experience,
            hire_year: e.hire_year,
            is_teacher: e.is_teacher(),
        });

        let fct_staffing = dataset
            .staffing()
            .iter()
            .map(|record| {
                let educator = dataset.educator(record.educator_id);
                FctStaffing {
                    school_id: record.school_id,
                    educator_id: record.educator_id,
                    school_year: record.school_year,
                    fte: record.fte,
                    subject_area: record.subject_area.clone(),
                    role: educator.map(|e| e.role),
                    is_teacher: educator.is_some_and(|e| e.is_teacher()),
                }
            })
            .collect();

        let fct_assessment = dataset
            .assessments()
            .iter()
            .map(|record| {
                let student = dataset.student(record.student_id);
                FctAssessment {
                    student_id: record.student_id,
                    school_id: record.school_id,
                    school_year: record.school_year,
                    term: record.term,
                    subject: record.subject.clone(),
                    scale_score: record.scale_score,
                    proficient_flag: record.proficient,
                    frpl_flag: student.map(|s| s.frpl),
                    ell_flag: student.map(|s| s.ell),
                    iep_flag: student.map(|s| s.iep),
                }
            })
            .collect();

        let bridge_student_school = dataset
            .enrollments()
            .iter()
            .map(|e| BridgeStudentSchool {
                student_id: e.student_id,
                school_id: e.school_id,
                school_year: e.school_year,
            })
            .collect();

        let bridge_student_program = dataset
            .programs()
            .iter()
            .map(|p| BridgeStudentProgram {
                student_id: p.student_id,
                program: p.program.clone(),
            })
            .collect();

        let tables = Self {
            dim_school,
            dim_student,
            dim_educator,
            fct_staffing,
            fct_assessment,
            bridge_student_school,
            bridge_student_program,
        };
        tracing::debug!(
            "Built curated tables: {} schools, {} students, {} educators, {} staffing facts, {} assessment facts",
            tables.dim_school.len(),
            tables.dim_student.len(),
            tables.dim_educator.len(),
            tables.fct_staffing.len(),
            tables.fct_assessment.len()
        );
        tables
    }

    /// Encodes every table as CSV, returning `(file name, contents)` pairs.
    pub fn encode(&self) -> Result<Vec<(&'static str, Vec<u8>)>> {
        Ok(vec![
            ("dim_school.csv", encode_csv("dim_school", &self.dim_school)?),
            ("dim_student.csv", encode_csv("dim_student", &self.dim_student)?),
            ("dim_educator.csv", encode_csv("dim_educator", &self.dim_educator)?),
            ("fct_staffing.csv", encode_csv("fct_staffing", &self.fct_staffing)?),
            ("fct_assessment.csv", encode_csv("fct_assessment", &self.fct_assessment)?),
            (
                "bridge_student_school.csv",
                encode_csv("bridge_student_school", &self.bridge_student_school)?,
            ),
            (
                "bridge_student_program.csv",
                encode_csv("bridge_student_program", &self.bridge_student_program)?,
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentRecord, Educator, Enrollment, StaffingRecord, Student};

    fn dataset() -> Dataset {
        Dataset::new(
            vec![],
            vec![
                Student {
                    student_id: StudentId(2),
                    grade_level: 0,
                    frpl: true,
                    ell: false,
                    iep: false,
                    school_id: None,
                },
                Student {
                    student_id: StudentId(1),
                    grade_level: 4,
                    frpl: false,
                    ell: true,
                    iep: false,
                    school_id: None,
                },
            ],
            vec![
                Educator {
                    educator_id: EducatorId(7),
                    role: Role::Teacher,
                    certification: None,
                    years_experience: 2,
                    hire_year: 2023,
                },
                Educator {
                    educator_id: EducatorId(7),
                    role: Role::Admin,
                    certification: None,
                    years_experience: 9,
                    hire_year: 2015,
                },
            ],
            vec![Enrollment {
                student_id: StudentId(1),
                school_id: SchoolId(1001),
                school_year: 2025,
            }],
            vec![
                StaffingRecord {
                    school_id: SchoolId(1001),
                    educator_id: EducatorId(7),
                    school_year: 2025,
                    fte: 1.0,
                    subject_area: "math".to_string(),
                },
                StaffingRecord {
                    school_id: SchoolId(1001),
                    educator_id: EducatorId(8),
                    school_year: 2025,
                    fte: 0.5,
                    subject_area: "ela".to_string(),
                },
            ],
            vec![AssessmentRecord {
                student_id: StudentId(9),
                school_id: SchoolId(1001),
                school_year: 2025,
                term: Term::Spring,
                subject: "math".to_string(),
                scale_score: 430.5,
                proficient: false,
            }],
        )
    }

    #[test]
    fn test_dimensions_sorted_and_deduplicated() {
        let tables = CuratedTables::build(&dataset());

        let ids: Vec<_> = tables.dim_student.iter().map(|s| s.student_id).collect();
        assert_eq!(ids, vec![StudentId(1), StudentId(2)]);
        assert_eq!(tables.dim_educator.len(), 1);
        assert_eq!(tables.dim_educator[0].role, Role::Teacher);
    }

    #[test]
    fn test_staffing_joins_role() {
        let tables = CuratedTables::build(&dataset());

        assert!(tables.fct_staffing[0].is_teacher);
        assert_eq!(tables.fct_staffing[1].role, None);
        assert!(!tables.fct_staffing[1].is_teacher);
        assert_eq!(tables.fct_assessment[0].frpl_flag, None);
    }

    #[test]
    fn test_csv_encoding() {
        let tables = CuratedTables::build(&dataset());
        let encoded = tables.encode().unwrap();

        let (name, staffing) = &encoded[3];
        assert_eq!(*name, "fct_staffing.csv");
        let text = String::from_utf8(staffing.clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("school_id,educator_id,school_year,fte,subject_area,role,is_teacher")
        );
        assert_eq!(lines.next(), Some("1001,7,2025,1.0,math,teacher,true"));
        assert_eq!(lines.next(), Some("1001,8,2025,0.5,ela,,false"));
    }

    #[test]
    fn test_empty_table_keeps_header() {
        let bytes = encode_csv::<DimSchool>("dim_school", &[]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "school_id,district_id,school_name,school_level,urbanicity\n"
        );
    }
}
