//! Read-only entity collections for one pipeline run.
//!
//! A [`Dataset`] owns every decoded table in input order (row indices are
//! stable and reported by rules) together with hash indices for O(1) lookup
//! by natural identifier. Nothing in a dataset is mutated after
//! construction.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::path::Path;

use crate::Result;
use crate::decode::{DecodeRecord, InputConfig, load_table_from_path};
use crate::model::{
    AssessmentRecord, Educator, EducatorId, Enrollment, ProgramParticipation, School, SchoolId,
    SchoolYear, StaffingRecord, Student, StudentId,
};

/// All entity collections for one run.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    schools: Vec<School>,
    students: Vec<Student>,
    educators: Vec<Educator>,
    enrollments: Vec<Enrollment>,
    staffing: Vec<StaffingRecord>,
    assessments: Vec<AssessmentRecord>,
    programs: Vec<ProgramParticipation>,

    school_index: HashMap<SchoolId, usize>,
    student_index: HashMap<StudentId, usize>,
    educator_index: HashMap<EducatorId, usize>,
    enrolled: HashSet<(StudentId, SchoolId, SchoolYear)>,
}

/// Maps each key to the index of its first occurrence.
fn first_occurrence<T, K: Hash + Eq>(rows: &[T], key: impl Fn(&T) -> K) -> HashMap<K, usize> {
    let mut index = HashMap::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        index.entry(key(row)).or_insert(position);
    }
    index
}

impl Dataset {
    /// Builds a dataset from decoded tables.
    pub fn new(
        schools: Vec<School>,
        students: Vec<Student>,
        educators: Vec<Educator>,
        enrollments: Vec<Enrollment>,
        staffing: Vec<StaffingRecord>,
        assessments: Vec<AssessmentRecord>,
    ) -> Self {
        let school_index = first_occurrence(&schools, |s| s.school_id);
        let student_index = first_occurrence(&students, |s| s.student_id);
        let educator_index = first_occurrence(&educators, |e| e.educator_id);
        let enrolled = enrollments
            .iter()
            .map(|e| (e.student_id, e.school_id, e.school_year))
            .collect();

        Self {
            schools,
            students,
            educators,
            enrollments,
            staffing,
            assessments,
            programs: Vec::new(),
            school_index,
            student_index,
            educator_index,
            enrolled,
        }
    }

    /// Attaches program participation rows.
    pub fn with_programs(mut self, programs: Vec<ProgramParticipation>) -> Self {
        self.programs = programs;
        self
    }

    /// Loads every table from `dir`, where each table is `<table>.csv`.
    ///
    /// `programs.csv` is optional; all other tables are required. The first
    /// decode error aborts the load.
    pub fn load_dir(dir: &Path, input: &InputConfig) -> Result<Self> {
        let schools = load::<School>(dir, input)?;
        let students = load::<Student>(dir, input)?;
        let educators = load::<Educator>(dir, input)?;
        let enrollments = load::<Enrollment>(dir, input)?;
        let staffing = load::<StaffingRecord>(dir, input)?;
        let assessments = load::<AssessmentRecord>(dir, input)?;

        let programs_path = table_path::<ProgramParticipation>(dir);
        let programs = if programs_path.exists() {
            load_table_from_path::<ProgramParticipation>(&programs_path, input)?
        } else {
            tracing::debug!("No {} found; no program cohorts", programs_path.display());
            Vec::new()
        };

        let dataset = Self::new(schools, students, educators, enrollments, staffing, assessments)
            .with_programs(programs);
        tracing::info!(
            "Loaded {} schools, {} students, {} educators, {} enrollments, {} staffing records, {} assessments",
            dataset.schools.len(),
            dataset.students.len(),
            dataset.educators.len(),
            dataset.enrollments.len(),
            dataset.staffing.len(),
            dataset.assessments.len()
        );
        Ok(dataset)
    }

    /// Schools in input order.
    pub fn schools(&self) -> &[School] {
        &self.schools
    }

    /// Students in input order.
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    /// Educators in input order, duplicates included.
    pub fn educators(&self) -> &[Educator] {
        &self.educators
    }

    /// Enrollment rows in input order.
    pub fn enrollments(&self) -> &[Enrollment] {
        &self.enrollments
    }

    /// Staffing records in input order.
    pub fn staffing(&self) -> &[StaffingRecord] {
        &self.staffing
    }

    /// Assessment records in input order.
    pub fn assessments(&self) -> &[AssessmentRecord] {
        &self.assessments
    }

    /// Program participation rows in input order.
    pub fn programs(&self) -> &[ProgramParticipation] {
        &self.programs
    }

    /// Looks up a school by id.
    pub fn school(&self, id: SchoolId) -> Option<&School> {
        self.school_index.get(&id).map(|&i| &self.schools[i])
    }

    /// Looks up a student by id.
    pub fn student(&self, id: StudentId) -> Option<&Student> {
        self.student_index.get(&id).map(|&i| &self.students[i])
    }

    /// Looks up an educator by id; the first row wins for duplicated ids.
    pub fn educator(&self, id: EducatorId) -> Option<&Educator> {
        self.educator_index.get(&id).map(|&i| &self.educators[i])
    }

    /// Returns true if the enrollment table has this (student, school, year).
    pub fn is_enrolled(&self, student: StudentId, school: SchoolId, year: SchoolYear) -> bool {
        self.enrolled.contains(&(student, school, year))
    }
}

fn table_path<T: DecodeRecord>(dir: &Path) -> std::path::PathBuf {
    dir.join(format!("{}.csv", T::TABLE))
}

fn load<T: DecodeRecord>(dir: &Path, input: &InputConfig) -> Result<Vec<T>> {
    load_table_from_path(&table_path::<T>(dir), input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn educator(id: u64, role: Role) -> Educator {
        Educator {
            educator_id: EducatorId(id),
            role,
            certification: Some("standard".to_string()),
            years_experience: 3,
            hire_year: 2022,
        }
    }

    #[test]
    fn test_lookup_uses_first_occurrence() {
        let dataset = Dataset::new(
            vec![],
            vec![],
            vec![
                educator(1, Role::Teacher),
                educator(2, Role::Admin),
                educator(1, Role::Counselor),
            ],
            vec![],
            vec![],
            vec![],
        );

        assert_eq!(dataset.educators().len(), 3);
        assert_eq!(
            dataset.educator(EducatorId(1)).map(|e| e.role),
            Some(Role::Teacher)
        );
        assert!(dataset.educator(EducatorId(9)).is_none());
    }

    #[test]
    fn test_enrollment_membership() {
        let dataset = Dataset::new(
            vec![],
            vec![],
            vec![],
            vec![Enrollment {
                student_id: StudentId(10),
                school_id: SchoolId(1001),
                school_year: 2025,
            }],
            vec![],
            vec![],
        );

        assert!(dataset.is_enrolled(StudentId(10), SchoolId(1001), 2025));
        assert!(!dataset.is_enrolled(StudentId(10), SchoolId(1001), 2024));
        assert!(!dataset.is_enrolled(StudentId(10), SchoolId(1002), 2025));
    }
}
