use super::IssueCollector;
use crate::terminology::TerminologyService;
use crate::types::{BindingStrength, ElementBinding, FhirValidationIssue, IssueCode, IssueSeverity};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Checks coded values against their element's value set binding.
///
/// The binding strength alone decides the severity of a failure; the
/// terminology service only decides whether a failure happened.
#[derive(Clone)]
pub struct TerminologyValidator {
    service: Arc<dyn TerminologyService>,
}

impl TerminologyValidator {
    pub fn new(service: Arc<dyn TerminologyService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Arc<dyn TerminologyService> {
        &self.service
    }

    /// Severity reported when a code fails a binding of `strength`.
    ///
    /// Example bindings never produce issues.
    pub fn severity_for(strength: BindingStrength) -> Option<IssueSeverity> {
        match strength {
            BindingStrength::Required => Some(IssueSeverity::Error),
            BindingStrength::Extensible => Some(IssueSeverity::Warning),
            BindingStrength::Preferred => Some(IssueSeverity::Information),
            BindingStrength::Example => None,
        }
    }

    /// Check a value of any coded shape: a plain code string, a Coding or a
    /// CodeableConcept. Other values are ignored.
    pub fn validate_value(
        &self,
        binding: &ElementBinding,
        value: &JsonValue,
        path: &str,
        collector: &IssueCollector,
    ) {
        match value {
            JsonValue::String(code) => self.validate_code(binding, None, code, path, collector),
            JsonValue::Object(map) if map.contains_key("code") && !map.contains_key("coding") => {
                self.validate_coding(binding, map, path, collector)
            }
            JsonValue::Object(map) => self.validate_concept(binding, map, path, collector),
            _ => {}
        }
    }

    /// Check a single code, optionally qualified by its system.
    pub fn validate_code(
        &self,
        binding: &ElementBinding,
        system: Option<&str>,
        code: &str,
        path: &str,
        collector: &IssueCollector,
    ) {
        let Some(severity) = Self::severity_for(binding.strength) else {
            return;
        };
        if !self.service.validate_code(system, code, &binding.value_set) {
            collector.add(self.not_in_value_set(binding, severity, code, path));
        }
    }

    /// Check a Coding (`{system, code}`); a coding without a code is skipped.
    pub fn validate_coding(
        &self,
        binding: &ElementBinding,
        coding: &Map<String, JsonValue>,
        path: &str,
        collector: &IssueCollector,
    ) {
        let Some(code) = coding.get("code").and_then(JsonValue::as_str) else {
            return;
        };
        let system = coding.get("system").and_then(JsonValue::as_str);
        self.validate_code(binding, system, code, path, collector);
    }

    /// Check a CodeableConcept: it passes when any of its codings is in the
    /// value set. A concept with no codings fails a required binding.
    pub fn validate_concept(
        &self,
        binding: &ElementBinding,
        concept: &Map<String, JsonValue>,
        path: &str,
        collector: &IssueCollector,
    ) {
        let Some(severity) = Self::severity_for(binding.strength) else {
            return;
        };

        let codings: Vec<(Option<&str>, &str)> = concept
            .get("coding")
            .and_then(JsonValue::as_array)
            .map(|codings| {
                codings
                    .iter()
                    .filter_map(|c| {
                        let code = c.get("code")?.as_str()?;
                        Some((c.get("system").and_then(JsonValue::as_str), code))
                    })
                    .collect()
            })
            .unwrap_or_default();

        if codings.is_empty() {
            if binding.strength == BindingStrength::Required {
                collector.add(
                    FhirValidationIssue::error(
                        IssueCode::Required,
                        format!(
                            "No code provided for required binding to value set '{}'",
                            binding.value_set
                        ),
                    )
                    .with_expression(path),
                );
            }
            return;
        }

        let any_valid = codings
            .iter()
            .any(|(system, code)| self.service.validate_code(*system, code, &binding.value_set));
        if !any_valid {
            let codes = codings
                .iter()
                .map(|(_, code)| *code)
                .collect::<Vec<_>>()
                .join(", ");
            collector.add(self.not_in_value_set(binding, severity, &codes, path));
        }
    }

    fn not_in_value_set(
        &self,
        binding: &ElementBinding,
        severity: IssueSeverity,
        code: &str,
        path: &str,
    ) -> FhirValidationIssue {
        FhirValidationIssue::new(
            severity,
            IssueCode::CodeInvalid,
            format!(
                "Code '{code}' is not in value set '{}' ({} binding)",
                binding.value_set, binding.strength
            ),
        )
        .with_expression(path)
    }
}

impl std::fmt::Debug for TerminologyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyValidator").finish_non_exhaustive()
    }
}
