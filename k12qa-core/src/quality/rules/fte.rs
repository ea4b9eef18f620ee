//! Educator FTE over-allocation per school year.

use std::collections::{BTreeMap, BTreeSet};

use crate::dataset::Dataset;
use crate::model::{EducatorId, SchoolId, SchoolYear};
use crate::quality::config::QaConfig;
use crate::quality::engine::QaRule;
use crate::quality::models::{EntityRef, Finding, Severity};

use super::round6;

/// An educator's total FTE in a school year must not exceed the limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct FteOverAllocation;

#[derive(Debug, Default)]
struct Allocation {
    total: f64,
    records: usize,
    schools: BTreeSet<SchoolId>,
}

impl QaRule for FteOverAllocation {
    fn id(&self) -> &'static str {
        "fte_over_allocation"
    }

    fn description(&self) -> &'static str {
        "Total FTE per educator per school year stays within the limit"
    }

    fn evaluate(&self, dataset: &Dataset, config: &QaConfig) -> Vec<Finding> {
        let mut allocations: BTreeMap<(EducatorId, SchoolYear), Allocation> = BTreeMap::new();
        for record in dataset.staffing() {
            let allocation = allocations
                .entry((record.educator_id, record.school_year))
                .or_default();
            allocation.total += record.fte;
            allocation.records += 1;
            allocation.schools.insert(record.school_id);
        }

        let threshold = config.fte_limit + config.fte_tolerance;
        allocations
            .into_iter()
            .filter(|(_, allocation)| allocation.total > threshold)
            .map(|((educator_id, school_year), allocation)| {
                let total_fte = round6(allocation.total);
                Finding::new(
                    self.id(),
                    Severity::Error,
                    vec![EntityRef::Educator(educator_id)],
                    format!(
                        "Educator {educator_id} is allocated {total_fte} FTE in {school_year}, above the limit of {}",
                        config.fte_limit
                    ),
                )
                .with_value("school_year", school_year)
                .with_value("total_fte", total_fte)
                .with_value("limit", config.fte_limit)
                .with_value("tolerance", config.fte_tolerance)
                .with_value("record_count", allocation.records)
                .with_value(
                    "school_ids",
                    allocation.schools.iter().map(|id| id.0).collect::<Vec<_>>(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::rules::test_support::{educator, staff};

    fn evaluate(records: Vec<crate::model::StaffingRecord>) -> Vec<Finding> {
        let ds = Dataset::new(
            vec![],
            vec![],
            vec![educator(1, Some("standard"))],
            vec![],
            records,
            vec![],
        );
        FteOverAllocation.evaluate(&ds, &QaConfig::default())
    }

    #[test]
    fn test_exactly_one_fte_passes() {
        assert!(evaluate(vec![staff(1, 1001, 2025, 0.5, "math"), staff(1, 1002, 2025, 0.5, "math")]).is_empty());
    }

    #[test]
    fn test_within_tolerance_passes() {
        assert!(evaluate(vec![staff(1, 1001, 2025, 1.000_001_1, "math")]).is_empty());
    }

    #[test]
    fn test_over_allocation_flagged() {
        let findings = evaluate(vec![
            staff(1, 1001, 2025, 0.6, "math"),
            staff(1, 1002, 2025, 0.45, "science"),
        ]);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.value_f64("total_fte"), Some(1.05));
        assert_eq!(finding.value_f64("limit"), Some(1.0));
        assert_eq!(finding.payload["record_count"], serde_json::json!(2));
        assert_eq!(finding.payload["school_ids"], serde_json::json!([1001, 1002]));
    }

    #[test]
    fn test_years_are_summed_separately() {
        let findings = evaluate(vec![
            staff(1, 1001, 2024, 0.8, "math"),
            staff(1, 1001, 2025, 0.8, "math"),
            staff(1, 1001, 2025, 0.4, "math"),
        ]);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].payload["school_year"], serde_json::json!(2025));
        assert_eq!(findings[0].value_f64("total_fte"), Some(1.2));
    }
}
