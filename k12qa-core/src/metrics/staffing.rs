//! Students-per-teacher tallies shared by the staffing ratio rule and the
//! KPI calculator.

use std::collections::{BTreeMap, HashSet};

use crate::model::{SchoolId, SchoolYear, StudentId};

use super::value::{MetricValue, ratio};

/// Enrolled students and teacher FTE for one school and year.
#[derive(Debug, Clone, PartialEq)]
pub struct SchoolStaffing {
    pub school_id: SchoolId,
    pub school_year: SchoolYear,
    /// Distinct enrolled students
    pub students: usize,
    /// Summed FTE of teacher staffing records
    pub teacher_fte: f64,
}

impl SchoolStaffing {
    /// Students per teacher FTE; undefined when there is no teacher FTE.
    pub fn students_per_teacher(&self) -> MetricValue {
        ratio(self.students as f64, self.teacher_fte)
    }
}

/// Tallies enrollments and teacher FTE per (school, year).
///
/// Every (school, year) seen on either side appears once, ordered by school
/// then year.
pub fn tally<E, T>(enrollments: E, teacher_fte: T) -> Vec<SchoolStaffing>
where
    E: IntoIterator<Item = (StudentId, SchoolId, SchoolYear)>,
    T: IntoIterator<Item = (SchoolId, SchoolYear, f64)>,
{
    let mut students: BTreeMap<(SchoolId, SchoolYear), HashSet<StudentId>> = BTreeMap::new();
    for (student_id, school_id, school_year) in enrollments {
        students
            .entry((school_id, school_year))
            .or_default()
            .insert(student_id);
    }

    let mut fte: BTreeMap<(SchoolId, SchoolYear), f64> = BTreeMap::new();
    for (school_id, school_year, value) in teacher_fte {
        students.entry((school_id, school_year)).or_default();
        *fte.entry((school_id, school_year)).or_default() += value;
    }

    students
        .into_iter()
        .map(|((school_id, school_year), enrolled)| SchoolStaffing {
            school_id,
            school_year,
            students: enrolled.len(),
            teacher_fte: fte.get(&(school_id, school_year)).copied().unwrap_or(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_counts_distinct_students() {
        let rows = tally(
            [
                (StudentId(1), SchoolId(1001), 2025),
                (StudentId(1), SchoolId(1001), 2025),
                (StudentId(2), SchoolId(1001), 2025),
            ],
            [(SchoolId(1001), 2025, 0.5), (SchoolId(1001), 2025, 0.5)],
        );

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].students, 2);
        assert_eq!(rows[0].teacher_fte, 1.0);
        assert_eq!(rows[0].students_per_teacher(), MetricValue::Defined(2.0));
    }

    #[test]
    fn test_no_teachers_is_undefined() {
        let no_staff: [(SchoolId, SchoolYear, f64); 0] = [];
        let rows = tally([(StudentId(1), SchoolId(1001), 2025)], no_staff);
        assert_eq!(rows[0].students_per_teacher(), MetricValue::Undefined);
    }

    #[test]
    fn test_staff_only_school_is_listed() {
        let no_students: [(StudentId, SchoolId, SchoolYear); 0] = [];
        let rows = tally(no_students, [(SchoolId(1002), 2025, 1.0)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].students, 0);
        assert_eq!(rows[0].students_per_teacher(), MetricValue::Defined(0.0));
    }
}
