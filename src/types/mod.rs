//! Core type definitions.
//!
//! - [`structure_definition`] - schema model (StructureDefinition, ElementDefinition, bindings, constraints)
//! - [`validation`] - issues and outcomes

pub mod structure_definition;
pub mod validation;

pub use structure_definition::{
    BindingStrength, ConstraintSeverity, ElementBinding, ElementConstraint, ElementDefinition,
    StructureDefinition, StructureKind, UNBOUNDED,
};
pub use validation::{FhirValidationIssue, FhirValidationOutcome, IssueCode, IssueSeverity};
