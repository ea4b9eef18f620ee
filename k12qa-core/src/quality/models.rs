//! Finding models produced by quality rules.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{EducatorId, SchoolId, StudentId};

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; never halts the pipeline
    Info,
    /// Plausible but unusual; halts only when configured to
    Warning,
    /// Invariant violated; halts the pipeline
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Reference to an entity affected by a finding.
///
/// Orders by kind, then numerically by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityRef {
    School(SchoolId),
    Student(StudentId),
    Educator(EducatorId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::School(id) => write!(f, "school {id}"),
            Self::Student(id) => write!(f, "student {id}"),
            Self::Educator(id) => write!(f, "educator {id}"),
        }
    }
}

/// A single reported data-quality violation or anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Id of the rule that produced this finding
    pub rule_id: String,
    /// Severity
    pub severity: Severity,
    /// Affected entities, most specific first
    pub entities: Vec<EntityRef>,
    /// Human-readable description
    pub message: String,
    /// The values that triggered the finding
    pub payload: Map<String, Value>,
}

impl Finding {
    /// Creates a finding with an empty payload.
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        entities: Vec<EntityRef>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            entities,
            message: message.into(),
            payload: Map::new(),
        }
    }

    /// Adds one payload value.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Reads a payload value as `f64`.
    pub fn value_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    /// Within-rule ordering: entities, then message, then payload.
    pub fn cmp_within_rule(&self, other: &Self) -> Ordering {
        self.entities
            .cmp(&other.entities)
            .then_with(|| self.message.cmp(&other.message))
            .then_with(|| payload_key(&self.payload).cmp(&payload_key(&other.payload)))
    }
}

fn payload_key(payload: &Map<String, Value>) -> String {
    // Map keys serialize in sorted order
    Value::Object(payload.clone()).to_string()
}

/// Sorts findings by each rule's position in `rule_order`, then rule id,
/// then [`Finding::cmp_within_rule`]. Rules absent from `rule_order` sort
/// last.
pub(crate) fn sort_by_rule_order<S: AsRef<str>>(findings: &mut [Finding], rule_order: &[S]) {
    let order: HashMap<&str, usize> = rule_order
        .iter()
        .enumerate()
        .map(|(position, id)| (id.as_ref(), position))
        .collect();
    let rank = |finding: &Finding| {
        order
            .get(finding.rule_id.as_str())
            .copied()
            .unwrap_or(usize::MAX)
    };

    findings.sort_by(|a, b| {
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.cmp_within_rule(b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"warning\"");
    }

    #[test]
    fn test_entity_ref_serialization() {
        let json = serde_json::to_value(EntityRef::Educator(EducatorId(3_000_001))).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "educator", "id": 3_000_001}));
    }

    #[test]
    fn test_payload_key_order_does_not_affect_ordering() {
        let a = Finding::new("r", Severity::Error, vec![], "x")
            .with_value("total_fte", 1.2)
            .with_value("limit", 1.0);
        let b = Finding::new("r", Severity::Error, vec![], "x")
            .with_value("limit", 1.0)
            .with_value("total_fte", 1.2);

        assert_eq!(a.cmp_within_rule(&b), Ordering::Equal);
        assert_eq!(payload_key(&a.payload), r#"{"limit":1.0,"total_fte":1.2}"#);
    }

    #[test]
    fn test_within_rule_ordering_is_numeric() {
        let a = Finding::new("r", Severity::Error, vec![EntityRef::Educator(EducatorId(99))], "x");
        let b = Finding::new("r", Severity::Error, vec![EntityRef::Educator(EducatorId(100))], "x");
        assert_eq!(a.cmp_within_rule(&b), Ordering::Less);
    }

    #[test]
    fn test_payload_breaks_ties() {
        let a = Finding::new("r", Severity::Error, vec![], "same").with_value("school_year", 2024);
        let b = Finding::new("r", Severity::Error, vec![], "same").with_value("school_year", 2025);
        assert_eq!(a.cmp_within_rule(&b), Ordering::Less);
        assert_eq!(a.value_f64("school_year"), Some(2024.0));
    }
}
