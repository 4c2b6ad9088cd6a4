//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use octofhir_conformance::{
    BindingStrength, ElementBinding, ElementConstraint, ElementDefinition, StructureDefinition,
};
use serde_json::{Value, json};

pub const GENDER_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/administrative-gender";
pub const OBSERVATION_STATUS_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/observation-status";
pub const PATIENT_PROFILE_URL: &str = "http://example.org/StructureDefinition/test-patient";
pub const OBSERVATION_PROFILE_URL: &str = "http://example.org/StructureDefinition/test-observation";

/// Patient profile requiring a name, with a required gender binding and an
/// invariant on contact details.
pub fn patient_profile() -> StructureDefinition {
    StructureDefinition::new(PATIENT_PROFILE_URL, "TestPatient", "Patient")
        .with_title("Test Patient")
        .with_base_definition("http://hl7.org/fhir/StructureDefinition/Patient")
        .with_element(ElementDefinition::new("Patient", 0, "*").with_constraint(
            ElementConstraint::error(
                "tp-1",
                "A patient with telecom must have a name",
                "telecom.exists() implies name.exists()",
            ),
        ))
        .with_element(ElementDefinition::new("Patient.name", 1, "*").with_type("HumanName"))
        .with_element(
            ElementDefinition::new("Patient.gender", 0, "1")
                .with_type("code")
                .with_binding(ElementBinding::new(BindingStrength::Required, GENDER_VALUE_SET)),
        )
        .with_element(ElementDefinition::new("Patient.photo", 0, "0"))
}

/// Minimal profile requiring only `Patient.name`.
pub fn named_patient_profile() -> StructureDefinition {
    StructureDefinition::new(
        "http://example.org/StructureDefinition/named-patient",
        "NamedPatient",
        "Patient",
    )
    .with_element(ElementDefinition::new("Patient.name", 1, "*"))
}

pub fn observation_profile() -> StructureDefinition {
    StructureDefinition::new(OBSERVATION_PROFILE_URL, "TestObservation", "Observation")
        .with_element(
            ElementDefinition::new("Observation.status", 1, "1").with_binding(ElementBinding::new(
                BindingStrength::Required,
                OBSERVATION_STATUS_VALUE_SET,
            )),
        )
        .with_element(ElementDefinition::new("Observation.code", 1, "1"))
        .with_element(ElementDefinition::new("Observation.category", 0, "*").with_pattern_value(
            r#"{"coding": [{"code": "vital-signs"}]}"#,
        ))
        .with_element(
            ElementDefinition::new("Observation", 0, "*").with_constraint(ElementConstraint::warning(
                "to-1",
                "A final observation should carry a value",
                "status != 'final' or valueQuantity.exists()",
            )),
        )
}

pub fn valid_patient() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "active": true,
        "name": [{"use": "official", "family": "Chalmers", "given": ["Peter", "James"]}],
        "telecom": [{"system": "phone", "value": "555-0100"}],
        "gender": "male",
        "birthDate": "1974-12-25"
    })
}

pub fn valid_observation() -> Value {
    json!({
        "resourceType": "Observation",
        "status": "final",
        "category": [{"coding": [{"system": "http://terminology.hl7.org/CodeSystem/observation-category", "code": "vital-signs"}]}],
        "code": {"text": "BP"},
        "valueQuantity": {"value": 120, "unit": "mmHg"}
    })
}
