use super::{
    CardinalityValidator, IssueCollector, TerminologyValidator, count_occurrences, discriminant,
    relative_path, values_at,
};
use crate::fhirpath::{FhirPathEngine, Value};
use crate::terminology::TerminologyService;
use crate::types::{
    ConstraintSeverity, ElementConstraint, ElementDefinition, FhirValidationIssue, IssueCode,
    IssueSeverity, StructureDefinition,
};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::trace;

/// Validates one record against one profile.
///
/// Per element it runs cardinality, fixed and pattern values, the terminology
/// binding, maxLength and the element's invariants. Every element is checked
/// even after earlier failures.
#[derive(Debug, Clone)]
pub struct ProfileValidator {
    cardinality: CardinalityValidator,
    terminology: TerminologyValidator,
    engine: FhirPathEngine,
}

impl ProfileValidator {
    pub fn new(terminology: Arc<dyn TerminologyService>, engine: FhirPathEngine) -> Self {
        Self {
            cardinality: CardinalityValidator::new(),
            terminology: TerminologyValidator::new(terminology),
            engine,
        }
    }

    pub fn engine(&self) -> &FhirPathEngine {
        &self.engine
    }

    pub fn validate(
        &self,
        profile: &StructureDefinition,
        record: &Map<String, JsonValue>,
        collector: &IssueCollector,
    ) {
        // an absent discriminant is checked against every profile
        if let Some(found) = discriminant(record)
            .filter(|rt| rt.as_str() != Some(profile.type_name.as_str()))
        {
            collector.add(FhirValidationIssue::error(
                IssueCode::Structure,
                format!(
                    "Resource type {} does not match profile '{}' (expected '{}')",
                    display_value(found),
                    profile.url,
                    profile.type_name
                ),
            ));
            return;
        }

        trace!(profile = %profile.url, elements = profile.elements.len(), "validating against profile");
        let root = Value::Object(record.clone());
        for element in &profile.elements {
            self.validate_element(profile, element, record, &root, collector);
        }
    }

    fn validate_element(
        &self,
        profile: &StructureDefinition,
        element: &ElementDefinition,
        record: &Map<String, JsonValue>,
        root: &Value,
        collector: &IssueCollector,
    ) {
        if let Some(field) = CardinalityValidator::field_name(&profile.type_name, &element.path) {
            self.cardinality
                .validate(element, count_occurrences(record, field), collector);
        }

        let values = relative_path(&profile.type_name, &element.path)
            .map(|path| values_at(record, path))
            .unwrap_or_default();

        for value in values {
            if let Some(fixed) = element
                .fixed_value
                .as_ref()
                .filter(|fixed| !matches_fixed(value, fixed))
            {
                collector.add(
                    FhirValidationIssue::error(
                        IssueCode::Value,
                        format!(
                            "Value {} of '{}' does not equal fixed value '{fixed}'",
                            display_value(value),
                            element.path
                        ),
                    )
                    .with_expression(&element.path),
                );
            }

            if let Some(pattern) = element
                .pattern_value
                .as_ref()
                .filter(|pattern| !matches_pattern(value, pattern))
            {
                collector.add(
                    FhirValidationIssue::error(
                        IssueCode::Value,
                        format!(
                            "Value {} of '{}' does not match pattern '{pattern}'",
                            display_value(value),
                            element.path
                        ),
                    )
                    .with_expression(&element.path),
                );
            }

            if let Some(binding) = &element.binding {
                self.terminology
                    .validate_value(binding, value, &element.path, collector);
            }

            if let (Some(max_length), JsonValue::String(s)) = (element.max_length, value) {
                let length = s.chars().count();
                if length > max_length {
                    collector.add(
                        FhirValidationIssue::error(
                            IssueCode::TooLong,
                            format!(
                                "Value of '{}' has length {length}, exceeding maxLength {max_length}",
                                element.path
                            ),
                        )
                        .with_expression(&element.path),
                    );
                }
            }
        }

        for constraint in &element.constraints {
            self.check_constraint(element, constraint, root, collector);
        }
    }

    fn check_constraint(
        &self,
        element: &ElementDefinition,
        constraint: &ElementConstraint,
        root: &Value,
        collector: &IssueCollector,
    ) {
        let Some(expression) = &constraint.expression else {
            return;
        };
        if self.engine.evaluate_with_root(expression, root).is_truthy() {
            return;
        }

        let severity = match constraint.severity {
            ConstraintSeverity::Error => IssueSeverity::Error,
            ConstraintSeverity::Warning => IssueSeverity::Warning,
        };
        collector.add(
            FhirValidationIssue::new(
                severity,
                IssueCode::Invariant,
                format!("Constraint '{}' failed: {}", constraint.key, constraint.human),
            )
            .with_expression(&element.path)
            .with_constraint_key(&constraint.key),
        );
    }
}

/// Exact comparison against a fixed value given in text form.
fn matches_fixed(value: &JsonValue, fixed: &str) -> bool {
    match value {
        JsonValue::String(s) => s == fixed,
        other => serde_json::from_str::<JsonValue>(fixed).is_ok_and(|f| &f == other),
    }
}

/// Substring match for strings, sub-structure match for complex values.
fn matches_pattern(value: &JsonValue, pattern: &str) -> bool {
    match serde_json::from_str::<JsonValue>(pattern) {
        Ok(structure @ (JsonValue::Object(_) | JsonValue::Array(_))) => {
            return json_contains(value, &structure);
        }
        _ => {}
    }
    match value {
        JsonValue::String(s) => s.contains(pattern),
        other => other.to_string().contains(pattern),
    }
}

/// Whether `actual` contains every member of `pattern`, recursively.
fn json_contains(actual: &JsonValue, pattern: &JsonValue) -> bool {
    match (actual, pattern) {
        (JsonValue::Object(actual), JsonValue::Object(pattern)) => pattern
            .iter()
            .all(|(key, p)| actual.get(key).is_some_and(|a| json_contains(a, p))),
        (JsonValue::Array(actual), JsonValue::Array(pattern)) => pattern
            .iter()
            .all(|p| actual.iter().any(|a| json_contains(a, p))),
        (JsonValue::Array(actual), p) => actual.iter().any(|a| json_contains(a, p)),
        (a, p) => a == p,
    }
}

fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::InMemoryTerminologyService;
    use crate::types::{BindingStrength, ElementBinding};
    use serde_json::json;

    fn validator() -> ProfileValidator {
        ProfileValidator::new(
            Arc::new(InMemoryTerminologyService::with_standard_value_sets()),
            FhirPathEngine::new(),
        )
    }

    fn run(profile: &StructureDefinition, record: JsonValue) -> Vec<FhirValidationIssue> {
        let collector = IssueCollector::default();
        validator().validate(profile, record.as_object().unwrap(), &collector);
        collector.into_outcome().into_issues()
    }

    fn patient_profile() -> StructureDefinition {
        StructureDefinition::new("http://example.org/StructureDefinition/p", "P", "Patient")
    }

    #[test]
    fn test_type_mismatch_stops() {
        let profile = patient_profile()
            .with_element(ElementDefinition::new("Patient.name", 1, "*"))
            .with_element(ElementDefinition::new("Patient.gender", 1, "1"));
        let issues = run(&profile, json!({"resourceType": "Observation"}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::Structure);
    }

    #[test]
    fn test_malformed_type_is_a_mismatch() {
        let profile = patient_profile()
            .with_element(ElementDefinition::new("Patient.a", 1, "*"))
            .with_element(ElementDefinition::new("Patient.b", 1, "1"));
        for record_type in [json!(42), json!(""), json!(["Patient"]), json!({"name": "Patient"})] {
            let issues = run(&profile, json!({"resourceType": record_type}));
            assert_eq!(issues.len(), 1, "resourceType {record_type}");
            assert_eq!(issues[0].code, IssueCode::Structure);
        }

        // absent or null: elements are checked
        assert_eq!(run(&profile, json!({})).len(), 2);
        assert_eq!(run(&profile, json!({"resourceType": null})).len(), 2);
    }

    #[test]
    fn test_all_elements_checked() {
        let profile = patient_profile()
            .with_element(ElementDefinition::new("Patient.name", 1, "*"))
            .with_element(ElementDefinition::new("Patient.gender", 1, "1"));
        let issues = run(&profile, json!({"resourceType": "Patient"}));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.code == IssueCode::Required));
    }

    #[test]
    fn test_fixed_value() {
        let profile = patient_profile()
            .with_element(ElementDefinition::new("Patient.active", 0, "1").with_fixed_value("true"))
            .with_element(ElementDefinition::new("Patient.language", 0, "1").with_fixed_value("en"));

        assert!(run(&profile, json!({"active": true, "language": "en"})).is_empty());

        let issues = run(&profile, json!({"active": false, "language": "en-US"}));
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.code == IssueCode::Value));
    }

    #[test]
    fn test_pattern_value() {
        let profile = patient_profile()
            .with_element(ElementDefinition::new("Patient.name.family", 0, "*").with_pattern_value("Sm"))
            .with_element(
                ElementDefinition::new("Patient.maritalStatus", 0, "1")
                    .with_pattern_value(r#"{"coding": [{"code": "M"}]}"#),
            );

        let record = json!({
            "name": [{"family": "Smith"}],
            "maritalStatus": {"coding": [{"system": "http://example.org", "code": "M"}], "text": "Married"}
        });
        assert!(run(&profile, record).is_empty());

        let record = json!({
            "name": [{"family": "Jones"}],
            "maritalStatus": {"coding": [{"code": "S"}]}
        });
        let issues = run(&profile, record);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].expression.as_deref(), Some("Patient.name.family"));
    }

    #[test]
    fn test_binding() {
        let profile = patient_profile().with_element(
            ElementDefinition::new("Patient.gender", 0, "1").with_binding(ElementBinding::new(
                BindingStrength::Required,
                "http://hl7.org/fhir/ValueSet/administrative-gender",
            )),
        );
        assert!(run(&profile, json!({"gender": "female"})).is_empty());

        let issues = run(&profile, json!({"gender": "F"}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::CodeInvalid);
    }

    #[test]
    fn test_max_length() {
        let profile = patient_profile()
            .with_element(ElementDefinition::new("Patient.name.given", 0, "*").with_max_length(5));
        let issues = run(&profile, json!({"name": [{"given": ["Ann", "Bartholomew"]}]}));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::TooLong);
    }

    #[test]
    fn test_constraints() {
        let profile = patient_profile().with_element(
            ElementDefinition::new("Patient", 0, "*")
                .with_constraint(ElementConstraint::error(
                    "pat-1",
                    "Patient must have a name or identifier",
                    "name.exists() or identifier.exists()",
                ))
                .with_constraint(ElementConstraint::warning(
                    "pat-2",
                    "Patient should be active",
                    "active = true",
                ))
                .with_constraint(ElementConstraint::new(
                    "pat-3",
                    ConstraintSeverity::Error,
                    "Documentation only",
                    None,
                )),
        );

        let issues = run(&profile, json!({"resourceType": "Patient"}));
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, IssueSeverity::Error);
        assert_eq!(issues[0].code, IssueCode::Invariant);
        assert_eq!(issues[0].constraint_key.as_deref(), Some("pat-1"));
        assert_eq!(issues[1].severity, IssueSeverity::Warning);
        assert_eq!(issues[1].constraint_key.as_deref(), Some("pat-2"));

        let issues = run(
            &profile,
            json!({"resourceType": "Patient", "name": [{"family": "Doe"}], "active": true}),
        );
        assert!(issues.is_empty());
    }

    #[test]
    fn test_json_contains() {
        assert!(json_contains(&json!({"a": 1, "b": 2}), &json!({"a": 1})));
        assert!(!json_contains(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(json_contains(&json!([1, 2, 3]), &json!([3, 1])));
        assert!(json_contains(&json!([{"x": 1}, {"y": 2}]), &json!({"y": 2})));
    }
}
