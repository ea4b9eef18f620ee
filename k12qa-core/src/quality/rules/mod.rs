//! Built-in quality rules.

mod certification;
mod coverage;
mod duplicates;
mod enrollment;
mod fte;
mod staffing_ratio;

pub use certification::TeacherCertification;
pub use coverage::AssessmentCoverage;
pub use duplicates::{DuplicateEducator, DuplicateSchool, DuplicateStudent};
pub use enrollment::{EnrollmentConsistency, EnrollmentReference};
pub use fte::FteOverAllocation;
pub use staffing_ratio::StaffingRatio;

/// Rounds a computed value for reporting so payloads stay readable.
pub(crate) fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
