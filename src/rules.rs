//! Custom validation rules.
//!
//! Callers extend validation with programmatic checks, either through the
//! built-in [`CustomRule`] variants or by implementing [`ValidationRule`]
//! themselves. Rules are kept in a [`RuleRegistry`] and run in registration
//! order against every record whose type they apply to.
//!
//! # Example
//!
//! ```
//! use octofhir_conformance::rules::{CustomRule, RuleRegistry};
//! use octofhir_conformance::validation::IssueCollector;
//! use serde_json::json;
//!
//! let registry = RuleRegistry::new();
//! registry.register(
//!     CustomRule::co_occurrence("obs-value-unit", "valueQuantity", "interpretation")
//!         .for_types(&["Observation"]),
//! );
//!
//! let record = json!({"resourceType": "Observation", "valueQuantity": {"value": 5}});
//! let collector = IssueCollector::default();
//! registry.validate(record.as_object().unwrap(), &collector);
//! assert_eq!(collector.len(), 1);
//! ```

use crate::types::{FhirValidationIssue, IssueCode};
use crate::validation::{IssueCollector, count_occurrences, resource_type, values_at};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Caller-supplied check run by [`RuleKind::Callback`].
pub type RuleCallback = Arc<dyn Fn(&Map<String, JsonValue>, &IssueCollector) + Send + Sync>;

/// A programmatic check over a record.
pub trait ValidationRule: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Record types this rule applies to; empty means every type.
    fn applicable_types(&self) -> &HashSet<String>;

    /// Whether the rule runs for a record of `record_type`.
    ///
    /// Rules restricted to specific types never run for records without a
    /// type discriminant.
    fn applies_to(&self, record_type: Option<&str>) -> bool {
        let types = self.applicable_types();
        types.is_empty() || record_type.is_some_and(|t| types.contains(t))
    }

    fn validate(&self, record: &Map<String, JsonValue>, collector: &IssueCollector);
}

/// The checks a [`CustomRule`] can perform.
#[derive(Clone)]
pub enum RuleKind {
    /// Every listed field must be present
    RequiredFields { fields: Vec<String> },
    /// When `if_present` is present, `then_required` must be too
    CoOccurrence {
        if_present: String,
        then_required: String,
    },
    /// String values of `field` must be one of `allowed`
    ValueConstraint { field: String, allowed: Vec<String> },
    Callback(RuleCallback),
}

impl std::fmt::Debug for RuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleKind::RequiredFields { fields } => f
                .debug_struct("RequiredFields")
                .field("fields", fields)
                .finish(),
            RuleKind::CoOccurrence {
                if_present,
                then_required,
            } => f
                .debug_struct("CoOccurrence")
                .field("if_present", if_present)
                .field("then_required", then_required)
                .finish(),
            RuleKind::ValueConstraint { field, allowed } => f
                .debug_struct("ValueConstraint")
                .field("field", field)
                .field("allowed", allowed)
                .finish(),
            RuleKind::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// A rule built from one of the [`RuleKind`] variants.
#[derive(Debug, Clone)]
pub struct CustomRule {
    pub id: String,
    pub description: String,
    pub applicable_types: HashSet<String>,
    pub kind: RuleKind,
}

impl CustomRule {
    pub fn new(id: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            applicable_types: HashSet::new(),
            kind,
        }
    }

    pub fn required_fields(id: impl Into<String>, fields: &[&str]) -> Self {
        Self::new(
            id,
            RuleKind::RequiredFields {
                fields: fields.iter().map(|f| f.to_string()).collect(),
            },
        )
    }

    pub fn co_occurrence(
        id: impl Into<String>,
        if_present: impl Into<String>,
        then_required: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            RuleKind::CoOccurrence {
                if_present: if_present.into(),
                then_required: then_required.into(),
            },
        )
    }

    pub fn value_constraint(id: impl Into<String>, field: impl Into<String>, allowed: &[&str]) -> Self {
        Self::new(
            id,
            RuleKind::ValueConstraint {
                field: field.into(),
                allowed: allowed.iter().map(|a| a.to_string()).collect(),
            },
        )
    }

    pub fn callback<F>(id: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Map<String, JsonValue>, &IssueCollector) + Send + Sync + 'static,
    {
        Self::new(id, RuleKind::Callback(Arc::new(callback)))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Restrict the rule to the given record types.
    pub fn for_types(mut self, types: &[&str]) -> Self {
        self.applicable_types
            .extend(types.iter().map(|t| t.to_string()));
        self
    }

    fn issue_path(record: &Map<String, JsonValue>, field: &str) -> String {
        match resource_type(record) {
            Some(record_type) => format!("{record_type}.{field}"),
            None => field.to_string(),
        }
    }
}

impl ValidationRule for CustomRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applicable_types(&self) -> &HashSet<String> {
        &self.applicable_types
    }

    fn validate(&self, record: &Map<String, JsonValue>, collector: &IssueCollector) {
        match &self.kind {
            RuleKind::RequiredFields { fields } => {
                for field in fields {
                    if count_occurrences(record, field) == 0 {
                        collector.add(
                            FhirValidationIssue::error(
                                IssueCode::Required,
                                format!("Rule '{}': required field '{field}' is missing", self.id),
                            )
                            .with_expression(Self::issue_path(record, field)),
                        );
                    }
                }
            }
            RuleKind::CoOccurrence {
                if_present,
                then_required,
            } => {
                if count_occurrences(record, if_present) > 0
                    && count_occurrences(record, then_required) == 0
                {
                    collector.add(
                        FhirValidationIssue::error(
                            IssueCode::BusinessRule,
                            format!(
                                "Rule '{}': '{then_required}' is required when '{if_present}' is present",
                                self.id
                            ),
                        )
                        .with_expression(Self::issue_path(record, then_required)),
                    );
                }
            }
            RuleKind::ValueConstraint { field, allowed } => {
                for value in values_at(record, field) {
                    let Some(text) = value.as_str() else {
                        continue;
                    };
                    if !allowed.iter().any(|a| a == text) {
                        collector.add(
                            FhirValidationIssue::error(
                                IssueCode::CodeInvalid,
                                format!(
                                    "Rule '{}': value '{text}' of '{field}' is not one of [{}]",
                                    self.id,
                                    allowed.join(", ")
                                ),
                            )
                            .with_expression(Self::issue_path(record, field)),
                        );
                    }
                }
            }
            RuleKind::Callback(callback) => callback(record, collector),
        }
    }
}

/// Registry of custom rules keyed by id, in registration order.
///
/// Readers take a snapshot of the applicable rules and run them outside the
/// lock, so rules may be registered or removed while validations run.
#[derive(Default)]
pub struct RuleRegistry {
    rules: RwLock<IndexMap<String, Arc<dyn ValidationRule>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule, replacing any rule with the same id.
    ///
    /// A replaced rule keeps its original position in the run order.
    pub fn register<R: ValidationRule + 'static>(&self, rule: R) -> Option<Arc<dyn ValidationRule>> {
        self.register_arc(Arc::new(rule))
    }

    pub fn register_arc(&self, rule: Arc<dyn ValidationRule>) -> Option<Arc<dyn ValidationRule>> {
        let id = rule.id().to_string();
        debug!(rule = %id, "registering custom rule");
        self.rules.write().insert(id, rule)
    }

    /// Remove a rule by id. Returns whether a rule was removed.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.rules.write().shift_remove(id).is_some();
        if removed {
            debug!(rule = id, "removed custom rule");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ValidationRule>> {
        self.rules.read().get(id).cloned()
    }

    /// All rules in registration order
    pub fn list(&self) -> Vec<Arc<dyn ValidationRule>> {
        self.rules.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.rules.read().keys().cloned().collect()
    }

    /// Rules that apply to `record_type`, in registration order
    pub fn applicable(&self, record_type: Option<&str>) -> Vec<Arc<dyn ValidationRule>> {
        self.rules
            .read()
            .values()
            .filter(|rule| rule.applies_to(record_type))
            .cloned()
            .collect()
    }

    /// Run every rule applicable to the record's type.
    pub fn validate(&self, record: &Map<String, JsonValue>, collector: &IssueCollector) {
        for rule in self.applicable(resource_type(record)) {
            rule.validate(record, collector);
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn clear(&self) {
        self.rules.write().clear();
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.ids())
            .finish()
    }
}
