//! Typed records for the six core K-12 entities.
//!
//! Records are plain immutable values produced by the decode step. Natural
//! identifiers are newtypes so that a student id can never be passed where
//! an educator id is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map(Self)
            }
        }
    };
}

entity_id!(
    /// Unique school identifier.
    SchoolId
);
entity_id!(
    /// Unique student identifier.
    StudentId
);
entity_id!(
    /// Unique educator identifier.
    EducatorId
);
entity_id!(
    /// District identifier referenced by schools.
    DistrictId
);

/// Academic year a record belongs to (e.g. `2025` for 2024-25).
pub type SchoolYear = i32;

/// Lowest accepted grade level (kindergarten).
pub const MIN_GRADE_LEVEL: u8 = 0;
/// Highest accepted grade level.
pub const MAX_GRADE_LEVEL: u8 = 12;

/// Error returned when an enumerated column holds an unknown label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// The accepted labels
    pub expected: &'static [&'static str],
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected one of {}", self.expected.join(", "))
    }
}

macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// All accepted labels, in declaration order.
            pub const LABELS: &'static [&'static str] = &[$($label),+];

            /// The canonical lowercase label.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($label => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant { expected: Self::LABELS }),
                }
            }
        }
    };
}

labelled_enum!(
    /// Educator role.
    Role {
        /// Classroom teacher
        Teacher => "teacher",
        /// School counselor
        Counselor => "counselor",
        /// School or district administrator
        Admin => "admin",
    }
);

labelled_enum!(
    /// School level.
    SchoolLevel {
        /// Elementary school
        Elementary => "elementary",
        /// Middle school
        Middle => "middle",
        /// High school
        High => "high",
    }
);

labelled_enum!(
    /// School locale classification.
    Urbanicity {
        /// Urban locale
        Urban => "urban",
        /// Suburban locale
        Suburban => "suburban",
        /// Rural locale
        Rural => "rural",
    }
);

labelled_enum!(
    /// Assessment administration window.
    Term {
        /// Fall window
        Fall => "fall",
        /// Winter window
        Winter => "winter",
        /// Spring window
        Spring => "spring",
    }
);

/// A school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct School {
    pub school_id: SchoolId,
    pub district_id: DistrictId,
    pub school_name: Option<String>,
    pub school_level: SchoolLevel,
    pub urbanicity: Urbanicity,
}

/// A student and their demographic/program flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: StudentId,
    pub grade_level: u8,
    pub frpl: bool,
    pub ell: bool,
    pub iep: bool,
    /// Enrollment school as reported on the student roster, if present.
    pub school_id: Option<SchoolId>,
}

/// An educator on the staff roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Educator {
    pub educator_id: EducatorId,
    pub role: Role,
    /// `None` when the roster reports no certification.
    pub certification: Option<String>,
    pub years_experience: u32,
    pub hire_year: SchoolYear,
}

impl Educator {
    /// Returns true if the educator holds a classroom teaching role.
    pub fn is_teacher(&self) -> bool {
        self.role == Role::Teacher
    }
}

/// A student's enrollment at a school for a school year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: StudentId,
    pub school_id: SchoolId,
    pub school_year: SchoolYear,
}

/// One staffing assignment of an educator to a school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingRecord {
    pub school_id: SchoolId,
    pub educator_id: EducatorId,
    pub school_year: SchoolYear,
    pub fte: f64,
    pub subject_area: String,
}

/// One assessment result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    pub student_id: StudentId,
    pub school_id: SchoolId,
    pub school_year: SchoolYear,
    pub term: Term,
    pub subject: String,
    pub scale_score: f64,
    pub proficient: bool,
}

/// A student's participation in a named program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramParticipation {
    pub student_id: StudentId,
    pub program: String,
}

/// Demographic or program-eligibility partition of students.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subgroup {
    /// Free/reduced-price lunch eligible
    Frpl,
    /// English-language learner
    Ell,
    /// Individualized education plan
    Iep,
}

impl Subgroup {
    /// Every flagged subgroup, in reporting order.
    pub const ALL: [Self; 3] = [Self::Frpl, Self::Ell, Self::Iep];

    /// Label for the flagged partition.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Frpl => "frpl",
            Self::Ell => "ell",
            Self::Iep => "iep",
        }
    }

    /// Label for the complement partition.
    pub fn complement_label(&self) -> &'static str {
        match self {
            Self::Frpl => "non_frpl",
            Self::Ell => "non_ell",
            Self::Iep => "non_iep",
        }
    }

    /// Whether the student belongs to the flagged partition.
    pub fn includes(&self, frpl: bool, ell: bool, iep: bool) -> bool {
        match self {
            Self::Frpl => frpl,
            Self::Ell => ell,
            Self::Iep => iep,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_labels_parse_case_insensitively() {
        assert_eq!("Teacher".parse::<Role>(), Ok(Role::Teacher));
        assert_eq!(" SPRING ".parse::<Term>(), Ok(Term::Spring));
        assert_eq!("suburban".parse::<Urbanicity>(), Ok(Urbanicity::Suburban));
    }

    #[test]
    fn test_unknown_label_lists_expected_values() {
        let err = "principal".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "expected one of teacher, counselor, admin");
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![EducatorId(3_000_010), EducatorId(999), EducatorId(3_000_002)];
        ids.sort();
        assert_eq!(ids, vec![EducatorId(999), EducatorId(3_000_002), EducatorId(3_000_010)]);
        assert_eq!(" 42".parse::<StudentId>(), Ok(StudentId(42)));
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&SchoolId(1001)).unwrap();
        assert_eq!(json, "1001");
    }

    #[test]
    fn test_subgroup_membership() {
        assert!(Subgroup::Ell.includes(false, true, false));
        assert!(!Subgroup::Iep.includes(true, true, false));
        assert_eq!(Subgroup::Frpl.complement_label(), "non_frpl");
    }
}
