//! Rule registry and engine.
//!
//! The [`RuleEngine`] runs every enabled rule of a [`RuleRegistry`] against a
//! [`Dataset`] and returns one flat, stably ordered list of findings.
//!
//! # Example
//!
//! ```rust,ignore
//! use k12qa_core::quality::{QaConfig, RuleEngine, RuleRegistry};
//!
//! let engine = RuleEngine::new(RuleRegistry::standard(), QaConfig::default());
//! let findings = engine.evaluate(&dataset);
//! println!("{} findings", findings.len());
//! ```

use std::fmt;
use std::sync::Arc;

use crate::dataset::Dataset;

use super::config::QaConfig;
use super::models::{Finding, Severity, sort_by_rule_order};
use super::rules;

/// A single, independent data-quality rule.
///
/// Rules must be pure: the findings they return may depend only on the
/// dataset and configuration, never on other rules or on evaluation order.
/// Missing reference data is reported as a finding, never as a panic.
pub trait QaRule: Send + Sync + fmt::Debug {
    /// Stable rule identifier used in findings and summaries.
    fn id(&self) -> &'static str;

    /// One-line description of the invariant the rule checks.
    fn description(&self) -> &'static str;

    /// Evaluates the rule.
    fn evaluate(&self, dataset: &Dataset, config: &QaConfig) -> Vec<Finding>;
}

/// Ordered collection of rules. Registration order is report order.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn QaRule>>,
}

impl RuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in rule, in report order.
    pub fn standard() -> Self {
        Self::new()
            .register(rules::DuplicateEducator)
            .register(rules::TeacherCertification)
            .register(rules::FteOverAllocation)
            .register(rules::EnrollmentConsistency)
            .register(rules::StaffingRatio)
            .register(rules::DuplicateStudent)
            .register(rules::DuplicateSchool)
            .register(rules::EnrollmentReference)
            .register(rules::AssessmentCoverage)
    }

    /// Appends a rule. A rule whose id is already registered is ignored.
    pub fn register(mut self, rule: impl QaRule + 'static) -> Self {
        if self.position(rule.id()).is_some() {
            tracing::warn!("Rule '{}' is already registered; ignoring", rule.id());
            return self;
        }
        self.rules.push(Arc::new(rule));
        self
    }

    /// Registered rules in order.
    pub fn rules(&self) -> &[Arc<dyn QaRule>] {
        &self.rules
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn position(&self, rule_id: &str) -> Option<usize> {
        self.rules.iter().position(|rule| rule.id() == rule_id)
    }
}

/// Evaluates registered rules and orders their findings.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    registry: RuleRegistry,
    config: Arc<QaConfig>,
}

impl RuleEngine {
    /// Creates a new engine.
    pub fn new(registry: RuleRegistry, config: QaConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    /// Engine with the standard registry and default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RuleRegistry::standard(), QaConfig::default())
    }

    /// Returns a reference to the engine configuration.
    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    /// Returns the registry.
    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Rules that will run, in order.
    pub fn active_rules(&self) -> impl Iterator<Item = &Arc<dyn QaRule>> {
        self.registry
            .rules()
            .iter()
            .filter(|rule| self.config.is_enabled(rule.id()))
    }

    /// Ids of the rules that will run, in order.
    pub fn active_rule_ids(&self) -> Vec<&'static str> {
        self.active_rules().map(|rule| rule.id()).collect()
    }

    /// Runs every enabled rule sequentially.
    pub fn evaluate(&self, dataset: &Dataset) -> Vec<Finding> {
        let mut findings = Vec::new();
        for rule in self.active_rules() {
            let produced = rule.evaluate(dataset, &self.config);
            tracing::debug!("Rule '{}' produced {} findings", rule.id(), produced.len());
            findings.extend(produced);
        }
        self.sort_findings(findings)
    }

    /// Runs every enabled rule on its own blocking task and fans in.
    ///
    /// Output is identical to [`RuleEngine::evaluate`]. A rule whose task
    /// fails (panics or is cancelled) is reported as an error finding for
    /// that rule instead of aborting the run.
    pub async fn evaluate_concurrent(&self, dataset: Arc<Dataset>) -> Vec<Finding> {
        let tasks = self.active_rules().map(|rule| {
            let rule = Arc::clone(rule);
            let dataset = Arc::clone(&dataset);
            let config = Arc::clone(&self.config);
            let rule_id = rule.id();
            let handle =
                tokio::task::spawn_blocking(move || rule.evaluate(&dataset, &config));
            async move { (rule_id, handle.await) }
        });

        let mut findings = Vec::new();
        for (rule_id, outcome) in futures::future::join_all(tasks).await {
            match outcome {
                Ok(produced) => {
                    tracing::debug!("Rule '{}' produced {} findings", rule_id, produced.len());
                    findings.extend(produced);
                }
                Err(e) => {
                    tracing::warn!("Rule '{}' did not complete: {}", rule_id, e);
                    findings.push(rule_failure(rule_id, &e.to_string()));
                }
            }
        }
        self.sort_findings(findings)
    }

    /// Orders findings by rule registration order, then within each rule by
    /// entity reference, message, and payload.
    fn sort_findings(&self, mut findings: Vec<Finding>) -> Vec<Finding> {
        let order: Vec<&str> = self.registry.rules().iter().map(|rule| rule.id()).collect();
        sort_by_rule_order(&mut findings, &order);
        findings
    }
}

fn rule_failure(rule_id: &str, reason: &str) -> Finding {
    Finding::new(
        rule_id,
        Severity::Error,
        Vec::new(),
        format!("Rule '{rule_id}' could not complete evaluation"),
    )
    .with_value("reason", reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Educator, EducatorId, Role};
    use crate::quality::models::EntityRef;

    #[derive(Debug)]
    struct FixedRule {
        id: &'static str,
        ids: Vec<u64>,
    }

    impl QaRule for FixedRule {
        fn id(&self) -> &'static str {
            self.id
        }

        fn description(&self) -> &'static str {
            "emits fixed findings"
        }

        fn evaluate(&self, _dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
            self.ids
                .iter()
                .map(|&id| {
                    Finding::new(
                        self.id,
                        Severity::Warning,
                        vec![EntityRef::Educator(EducatorId(id))],
                        "fixed",
                    )
                })
                .collect()
        }
    }

    #[derive(Debug)]
    struct PanickingRule;

    impl QaRule for PanickingRule {
        fn id(&self) -> &'static str {
            "panicking"
        }

        fn description(&self) -> &'static str {
            "always panics"
        }

        #[allow(clippy::panic)]
        fn evaluate(&self, _dataset: &Dataset, _config: &QaConfig) -> Vec<Finding> {
            panic!("rule bug");
        }
    }

    fn registry() -> RuleRegistry {
        RuleRegistry::new()
            .register(FixedRule {
                id: "second_registered_first",
                ids: vec![30, 10, 20],
            })
            .register(FixedRule {
                id: "a_rule",
                ids: vec![2, 1],
            })
    }

    #[test]
    fn test_standard_registry_order() {
        let ids: Vec<_> = RuleRegistry::standard()
            .rules()
            .iter()
            .map(|rule| rule.id())
            .collect();
        assert_eq!(
            &ids[..5],
            &[
                "duplicate_educator",
                "teacher_certification",
                "fte_over_allocation",
                "enrollment_consistency",
                "staffing_ratio",
            ]
        );
        assert_eq!(ids.len(), 9);
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let registry = RuleRegistry::new()
            .register(FixedRule { id: "x", ids: vec![1] })
            .register(FixedRule { id: "x", ids: vec![2] });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_findings_sorted_by_registration_then_entity() {
        let engine = RuleEngine::new(registry(), QaConfig::default());
        let findings = engine.evaluate(&Dataset::default());

        let order: Vec<_> = findings
            .iter()
            .map(|f| (f.rule_id.as_str(), f.entities[0]))
            .collect();
        assert_eq!(
            order,
            vec![
                ("second_registered_first", EntityRef::Educator(EducatorId(10))),
                ("second_registered_first", EntityRef::Educator(EducatorId(20))),
                ("second_registered_first", EntityRef::Educator(EducatorId(30))),
                ("a_rule", EntityRef::Educator(EducatorId(1))),
                ("a_rule", EntityRef::Educator(EducatorId(2))),
            ]
        );
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let engine = RuleEngine::new(registry(), QaConfig::new().with_disabled_rule("a_rule"));
        assert_eq!(engine.active_rule_ids(), vec!["second_registered_first"]);
        assert!(engine
            .evaluate(&Dataset::default())
            .iter()
            .all(|f| f.rule_id != "a_rule"));
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let dataset = Dataset::new(
            vec![],
            vec![],
            vec![
                Educator {
                    educator_id: EducatorId(5),
                    role: Role::Teacher,
                    certification: None,
                    years_experience: 1,
                    hire_year: 2024,
                },
                Educator {
                    educator_id: EducatorId(5),
                    role: Role::Teacher,
                    certification: None,
                    years_experience: 1,
                    hire_year: 2024,
                },
            ],
            vec![],
            vec![],
            vec![],
        );
        let engine = RuleEngine::with_defaults();

        let first = serde_json::to_string(&engine.evaluate(&dataset)).unwrap();
        let second = serde_json::to_string(&engine.evaluate(&dataset)).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let engine = RuleEngine::new(registry(), QaConfig::default());
        let dataset = Arc::new(Dataset::default());

        let sequential = engine.evaluate(&dataset);
        let concurrent = engine.evaluate_concurrent(Arc::clone(&dataset)).await;
        assert_eq!(sequential, concurrent);
    }

    #[tokio::test]
    async fn test_concurrent_failure_becomes_finding() {
        let engine = RuleEngine::new(registry().register(PanickingRule), QaConfig::default());
        let findings = engine.evaluate_concurrent(Arc::new(Dataset::default())).await;

        let failure = findings
            .iter()
            .find(|f| f.rule_id == "panicking")
            .unwrap();
        assert_eq!(failure.severity, Severity::Error);
        assert_eq!(findings.len(), 6);
        assert_eq!(findings.last().map(|f| f.rule_id.as_str()), Some("panicking"));
    }
}
