//! Top-level validation entry point.

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::fhirpath::FhirPathEngine;
use crate::rules::{RuleRegistry, ValidationRule};
use crate::terminology::{InMemoryTerminologyService, TerminologyService};
use crate::types::{FhirValidationIssue, FhirValidationOutcome, IssueCode, StructureDefinition};
use crate::validation::{IssueCollector, ProfileValidator, discriminant};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resource types recognized without a registered profile.
const KNOWN_RESOURCE_TYPES: &[&str] = &[
    "AllergyIntolerance",
    "Appointment",
    "Binary",
    "Bundle",
    "CarePlan",
    "CodeSystem",
    "Composition",
    "Condition",
    "Consent",
    "Coverage",
    "Device",
    "DiagnosticReport",
    "DocumentReference",
    "Encounter",
    "Immunization",
    "Location",
    "Medication",
    "MedicationRequest",
    "MedicationStatement",
    "Observation",
    "OperationOutcome",
    "Organization",
    "Parameters",
    "Patient",
    "Practitioner",
    "PractitionerRole",
    "Procedure",
    "Questionnaire",
    "QuestionnaireResponse",
    "ServiceRequest",
    "Specimen",
    "StructureDefinition",
    "ValueSet",
];

/// Fields every resource of the given type must carry.
const REQUIRED_FIELDS: &[(&str, &[&str])] = &[
    ("Observation", &["status", "code"]),
    ("DiagnosticReport", &["status", "code"]),
    ("Condition", &["subject"]),
    ("Encounter", &["status", "class"]),
    ("Procedure", &["status", "subject"]),
    ("MedicationRequest", &["status", "intent", "subject"]),
    ("Immunization", &["status", "vaccineCode", "patient"]),
    ("AllergyIntolerance", &["patient"]),
    ("Bundle", &["type"]),
];

fn required_fields(resource_type: &str) -> &'static [&'static str] {
    REQUIRED_FIELDS
        .iter()
        .find(|(rt, _)| *rt == resource_type)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

/// Validates records against structural checks, registered profiles and
/// custom rules.
///
/// The validator is `Send + Sync`; profiles and rules may be registered or
/// removed while other threads validate.
///
/// # Example
///
/// ```
/// use octofhir_conformance::Validator;
/// use serde_json::json;
///
/// let validator = Validator::new();
/// let outcome = validator.validate(&json!({"resourceType": "Observation"}));
/// assert!(!outcome.is_valid());
/// assert_eq!(outcome.error_count(), 2);
/// ```
pub struct Validator {
    config: ValidatorConfig,
    profiles: RwLock<IndexMap<String, Arc<StructureDefinition>>>,
    rules: RuleRegistry,
    terminology: Arc<dyn TerminologyService>,
    profile_validator: ProfileValidator,
}

impl Validator {
    /// Create a validator with the default configuration and the standard
    /// value sets.
    pub fn new() -> Self {
        Self::with_config(ValidatorConfig::default())
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        let terminology: Arc<dyn TerminologyService> =
            Arc::new(InMemoryTerminologyService::with_standard_value_sets());
        let engine = FhirPathEngine::with_cache_size(config.expression_cache_size);
        Self {
            profile_validator: ProfileValidator::new(terminology.clone(), engine),
            config,
            profiles: RwLock::new(IndexMap::new()),
            rules: RuleRegistry::new(),
            terminology,
        }
    }

    /// Replace the terminology service used for binding checks.
    pub fn with_terminology_service(mut self, service: Arc<dyn TerminologyService>) -> Self {
        let engine = self.profile_validator.engine().clone();
        self.profile_validator = ProfileValidator::new(service.clone(), engine);
        self.terminology = service;
        self
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn terminology(&self) -> &Arc<dyn TerminologyService> {
        &self.terminology
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// Register a profile under its url, replacing any previous one.
    pub fn register_profile(&self, profile: StructureDefinition) -> Option<Arc<StructureDefinition>> {
        debug!(url = %profile.url, type_name = %profile.type_name, elements = profile.elements.len(), "registering profile");
        self.profiles
            .write()
            .insert(profile.url.clone(), Arc::new(profile))
    }

    /// Load a StructureDefinition from JSON and register it.
    pub fn register_profile_json(&self, json: &str) -> Result<()> {
        self.register_profile(StructureDefinition::from_json(json)?);
        Ok(())
    }

    pub fn remove_profile(&self, url: &str) -> bool {
        let removed = self.profiles.write().shift_remove(url).is_some();
        if removed {
            debug!(url, "removed profile");
        }
        removed
    }

    pub fn clear_profiles(&self) {
        self.profiles.write().clear();
    }

    pub fn profile(&self, url: &str) -> Option<Arc<StructureDefinition>> {
        self.profiles.read().get(url).cloned()
    }

    pub fn profile_urls(&self) -> Vec<String> {
        self.profiles.read().keys().cloned().collect()
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn register_rule<R: ValidationRule + 'static>(&self, rule: R) {
        self.rules.register(rule);
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        self.rules.remove(id)
    }

    /// Validate a JSON record.
    ///
    /// Never fails: a value that is not a JSON object yields a single
    /// processing error.
    pub fn validate(&self, resource: &JsonValue) -> FhirValidationOutcome {
        let collector = IssueCollector::new(self.config.max_issues);
        match resource.as_object() {
            Some(record) => self.run(record, &collector),
            None => {
                collector.add(FhirValidationIssue::error(
                    IssueCode::Processing,
                    "Resource must be a JSON object",
                ));
            }
        }
        self.finish(collector)
    }

    /// Validate any serializable record.
    pub fn validate_resource<T: Serialize>(&self, resource: &T) -> FhirValidationOutcome {
        match serde_json::to_value(resource) {
            Ok(value) => self.validate(&value),
            Err(e) => processing_failure(format!("Failed to serialize resource: {e}")),
        }
    }

    /// Validate a record given as JSON text.
    pub fn validate_json(&self, json: &str) -> FhirValidationOutcome {
        match serde_json::from_str::<JsonValue>(json) {
            Ok(value) => self.validate(&value),
            Err(e) => processing_failure(format!("Invalid JSON: {e}")),
        }
    }

    /// Validate a record against one registered profile only.
    pub fn validate_against_profile(&self, resource: &JsonValue, url: &str) -> FhirValidationOutcome {
        let Some(record) = resource.as_object() else {
            return processing_failure("Resource must be a JSON object".to_string());
        };
        let Some(profile) = self.profile(url) else {
            return FhirValidationOutcome::from_issues(vec![FhirValidationIssue::error(
                IssueCode::NotFound,
                format!("Profile '{url}' is not registered"),
            )]);
        };

        let collector = IssueCollector::new(self.config.max_issues);
        self.profile_validator.validate(&profile, record, &collector);
        self.finish(collector)
    }

    fn run(&self, record: &Map<String, JsonValue>, collector: &IssueCollector) {
        if self.config.validate_structure {
            self.validate_structure(record, collector);
        }

        if self.config.validate_profiles {
            for profile in self.matching_profiles(discriminant(record)) {
                self.profile_validator.validate(&profile, record, collector);
            }
        }

        if self.config.validate_custom_rules {
            self.rules.validate(record, collector);
        }
    }

    fn finish(&self, collector: IssueCollector) -> FhirValidationOutcome {
        let outcome = collector.into_outcome();
        debug!(
            issues = outcome.len(),
            errors = outcome.error_count(),
            valid = outcome.is_valid(),
            "validation complete"
        );
        outcome
    }

    /// Snapshot of the profiles for the record's discriminant; every profile
    /// when it is absent, none when it is not a string.
    fn matching_profiles(&self, record_type: Option<&JsonValue>) -> Vec<Arc<StructureDefinition>> {
        self.profiles
            .read()
            .values()
            .filter(|p| record_type.is_none_or(|rt| rt.as_str() == Some(p.type_name.as_str())))
            .cloned()
            .collect()
    }

    fn is_known_type(&self, record_type: &str) -> bool {
        KNOWN_RESOURCE_TYPES.contains(&record_type)
            || self
                .profiles
                .read()
                .values()
                .any(|p| p.type_name == record_type)
    }

    fn validate_structure(&self, record: &Map<String, JsonValue>, collector: &IssueCollector) {
        let record_type = match record.get("resourceType") {
            None | Some(JsonValue::Null) => {
                collector.add(FhirValidationIssue::error(
                    IssueCode::Required,
                    "Missing required field 'resourceType'",
                ));
                return;
            }
            Some(JsonValue::String(rt)) if rt.is_empty() => {
                collector.add(
                    FhirValidationIssue::error(IssueCode::Value, "resourceType must not be empty")
                        .with_expression("resourceType"),
                );
                return;
            }
            Some(JsonValue::String(rt)) => rt.as_str(),
            Some(other) => {
                collector.add(
                    FhirValidationIssue::error(
                        IssueCode::Value,
                        format!("resourceType must be a string, found {other}"),
                    )
                    .with_expression("resourceType"),
                );
                return;
            }
        };

        if self.config.strict_resource_type_checking && !self.is_known_type(record_type) {
            warn!(resource_type = record_type, "unknown resource type");
            collector.add(
                FhirValidationIssue::warning(
                    IssueCode::Value,
                    format!("Unknown resource type '{record_type}'"),
                )
                .with_expression("resourceType"),
            );
        }

        for field in required_fields(record_type) {
            let message = match record.get(*field) {
                None | Some(JsonValue::Null) => format!("Missing required field '{field}'"),
                Some(JsonValue::Array(items)) if items.is_empty() => {
                    format!("Required field '{field}' must not be empty")
                }
                Some(_) => continue,
            };
            collector.add(
                FhirValidationIssue::error(IssueCode::Required, message)
                    .with_expression(format!("{record_type}.{field}")),
            );
        }
    }
}

fn processing_failure(details: String) -> FhirValidationOutcome {
    FhirValidationOutcome::from_issues(vec![FhirValidationIssue::error(
        IssueCode::Processing,
        details,
    )])
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("config", &self.config)
            .field("profiles", &self.profile_urls())
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}
