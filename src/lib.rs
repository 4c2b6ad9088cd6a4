//! octofhir-conformance - FHIR conformance validation.
//!
//! This crate provides:
//! - Structural checks and profile validation (cardinality, fixed and pattern
//!   values, maxLength, terminology bindings)
//! - A FHIRPath subset for invariants and ad-hoc predicates
//! - Pluggable terminology services with caching
//! - Custom validation rules
//!
//! Validation never fails: every problem becomes an issue in the returned
//! [`FhirValidationOutcome`].
//!
//! # Quick Start
//!
//! ```
//! use octofhir_conformance::{ElementDefinition, StructureDefinition, Validator};
//! use serde_json::json;
//!
//! let validator = Validator::new();
//! validator.register_profile(
//!     StructureDefinition::new("http://example.org/StructureDefinition/named-patient", "NamedPatient", "Patient")
//!         .with_element(ElementDefinition::new("Patient.name", 1, "*")),
//! );
//!
//! let outcome = validator.validate(&json!({"resourceType": "Patient"}));
//! assert!(!outcome.is_valid());
//! assert_eq!(outcome.errors()[0].expression.as_deref(), Some("Patient.name"));
//! ```
//!
//! # Module Organization
//!
//! - [`types`] - Schema model, issues and outcomes
//! - [`fhirpath`] - Path expression tokenizer, parser and evaluator
//! - [`terminology`] - Terminology services and value set definitions
//! - [`validation`] - Issue collector and element-level validators
//! - [`rules`] - Custom rule framework
//! - [`validator`] - The orchestrating [`Validator`]

pub mod config;
pub mod error;
pub mod fhirpath;
pub mod rules;
pub mod terminology;
pub mod types;
pub mod validation;
pub mod validator;

// Error exports
pub use error::{ConformanceError, Result};

// Type exports
pub use types::{
    BindingStrength, ConstraintSeverity, ElementBinding, ElementConstraint, ElementDefinition,
    FhirValidationIssue, FhirValidationOutcome, IssueCode, IssueSeverity, StructureDefinition,
    StructureKind, UNBOUNDED,
};

// Expression exports
pub use fhirpath::{FhirPathEngine, Value};

// Terminology exports
pub use terminology::{
    CacheConfig, CacheStats, CachedTerminologyService, CodeSystemDefinition, Concept,
    InMemoryTerminologyService, TerminologyService, ValueSetDefinition, ValueSetInclude,
};

// Validation exports
pub use config::ValidatorConfig;
pub use rules::{CustomRule, RuleKind, RuleRegistry, ValidationRule};
pub use validation::{CardinalityValidator, IssueCollector, ProfileValidator, TerminologyValidator};
pub use validator::Validator;
