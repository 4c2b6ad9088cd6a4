//! Schema model types.
//!
//! A [`StructureDefinition`] describes the structural and terminology
//! constraints of one record type as a flat list of [`ElementDefinition`]s.
//! These are plain data: nothing is checked for internal consistency when a
//! definition is built (a `min` larger than `max` is kept as written).

use serde::{Deserialize, Serialize};

use crate::error::{ConformanceError, Result};

/// Sentinel used by `max` for an unbounded upper cardinality.
pub const UNBOUNDED: &str = "*";

/// FHIR binding strength levels, ordered from weakest to strongest enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingStrength {
    /// Value set is just an example
    Example,
    /// Code SHOULD be from the value set for interoperability
    Preferred,
    /// Code SHOULD be from the value set, but others allowed with text
    Extensible,
    /// Code MUST be from the value set
    Required,
}

impl BindingStrength {
    /// Parse binding strength from string
    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "required" => Some(BindingStrength::Required),
            "extensible" => Some(BindingStrength::Extensible),
            "preferred" => Some(BindingStrength::Preferred),
            "example" => Some(BindingStrength::Example),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BindingStrength::Required => "required",
            BindingStrength::Extensible => "extensible",
            BindingStrength::Preferred => "preferred",
            BindingStrength::Example => "example",
        }
    }
}

impl std::fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminology binding of a coded element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementBinding {
    pub strength: BindingStrength,
    #[serde(rename = "valueSet")]
    pub value_set: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ElementBinding {
    pub fn new(strength: BindingStrength, value_set: impl Into<String>) -> Self {
        Self {
            strength,
            value_set: value_set.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Severity declared by an invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintSeverity {
    Error,
    Warning,
}

/// An invariant attached to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementConstraint {
    /// Constraint key/identifier (e.g. "obs-6")
    pub key: String,
    pub severity: ConstraintSeverity,
    /// Human-readable description
    pub human: String,
    /// FHIRPath expression; constraints without one are informational only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl ElementConstraint {
    pub fn new(
        key: impl Into<String>,
        severity: ConstraintSeverity,
        human: impl Into<String>,
        expression: Option<&str>,
    ) -> Self {
        Self {
            key: key.into(),
            severity,
            human: human.into(),
            expression: expression.map(str::to_string),
        }
    }

    pub fn error(key: impl Into<String>, human: impl Into<String>, expression: &str) -> Self {
        Self::new(key, ConstraintSeverity::Error, human, Some(expression))
    }

    pub fn warning(key: impl Into<String>, human: impl Into<String>, expression: &str) -> Self {
        Self::new(key, ConstraintSeverity::Warning, human, Some(expression))
    }
}

/// One field-level constraint entry of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDefinition {
    /// Dotted path, rooted at the record type (e.g. "Patient.name")
    pub path: String,
    #[serde(default)]
    pub min: u32,
    /// Upper bound: "*" or a non-negative integer
    #[serde(default = "default_max")]
    pub max: String,
    /// Type codes; accepts both `["string"]` and `[{"code": "string"}]`
    #[serde(
        default,
        rename = "type",
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "deserialize_type_codes"
    )]
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_value: Option<String>,
    #[serde(default)]
    pub must_support: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binding: Option<ElementBinding>,
    #[serde(default, rename = "constraint", skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ElementConstraint>,
    #[serde(default)]
    pub is_modifier: bool,
    #[serde(default)]
    pub is_summary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_name: Option<String>,
    /// Maximum length of string values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

fn default_max() -> String {
    UNBOUNDED.to_string()
}

fn deserialize_type_codes<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TypeRef {
        Code(String),
        Typed { code: String },
    }

    let refs = Vec::<TypeRef>::deserialize(deserializer)?;
    Ok(refs
        .into_iter()
        .map(|r| match r {
            TypeRef::Code(code) | TypeRef::Typed { code } => code,
        })
        .collect())
}

impl ElementDefinition {
    /// Create an element with the given path and cardinality.
    pub fn new(path: impl Into<String>, min: u32, max: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            min,
            max: max.into(),
            types: Vec::new(),
            fixed_value: None,
            pattern_value: None,
            must_support: false,
            binding: None,
            constraints: Vec::new(),
            is_modifier: false,
            is_summary: false,
            slice_name: None,
            max_length: None,
        }
    }

    /// `min >= 1`
    pub fn is_required(&self) -> bool {
        self.min >= 1
    }

    /// `max == "0"`
    pub fn is_prohibited(&self) -> bool {
        self.max == "0"
    }

    /// Numeric upper bound, `None` when unbounded (or unparseable).
    pub fn max_int(&self) -> Option<u32> {
        if self.max == UNBOUNDED {
            None
        } else {
            self.max.parse().ok()
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.types.push(type_name.into());
        self
    }

    pub fn with_fixed_value(mut self, value: impl Into<String>) -> Self {
        self.fixed_value = Some(value.into());
        self
    }

    pub fn with_pattern_value(mut self, value: impl Into<String>) -> Self {
        self.pattern_value = Some(value.into());
        self
    }

    pub fn with_binding(mut self, binding: ElementBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_constraint(mut self, constraint: ElementConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn must_support(mut self) -> Self {
        self.must_support = true;
        self
    }

    pub fn modifier(mut self) -> Self {
        self.is_modifier = true;
        self
    }

    pub fn summary(mut self) -> Self {
        self.is_summary = true;
        self
    }

    pub fn with_slice_name(mut self, slice_name: impl Into<String>) -> Self {
        self.slice_name = Some(slice_name.into());
        self
    }
}

/// Kind of structure a schema defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureKind {
    PrimitiveType,
    ComplexType,
    Resource,
    Logical,
}

/// A schema: the constraints one record type must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinition {
    /// The canonical URL of the schema
    pub url: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub kind: StructureKind,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_definition: Option<String>,
    /// Record type this schema applies to (the `resourceType` discriminant)
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, rename = "element")]
    pub elements: Vec<ElementDefinition>,
}

fn default_status() -> String {
    "active".to_string()
}

impl StructureDefinition {
    /// Create a resource profile with no elements.
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        type_name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            title: None,
            status: default_status(),
            kind: StructureKind::Resource,
            is_abstract: false,
            base_definition: None,
            type_name: type_name.into(),
            version: None,
            elements: Vec::new(),
        }
    }

    /// Load a definition from its JSON form.
    ///
    /// A `resourceType` member, when present, must be "StructureDefinition".
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(mut value: serde_json::Value) -> Result<Self> {
        ConformanceError::check_resource_type(&value, "StructureDefinition")?;
        lift_element_list(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_kind(mut self, kind: StructureKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_base_definition(mut self, base: impl Into<String>) -> Self {
        self.base_definition = Some(base.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_element(mut self, element: ElementDefinition) -> Self {
        self.elements.push(element);
        self
    }

    /// Find the first element with the given path.
    pub fn element(&self, path: &str) -> Option<&ElementDefinition> {
        self.elements.iter().find(|e| e.path == path)
    }
}

/// Published definitions carry their elements under `snapshot` or
/// `differential`; use the first one found when there is no flat list.
fn lift_element_list(value: &mut serde_json::Value) {
    let Some(map) = value.as_object_mut() else {
        return;
    };
    if map.contains_key("element") {
        return;
    }
    for section in ["snapshot", "differential"] {
        let elements = map
            .get_mut(section)
            .and_then(|s| s.get_mut("element"))
            .map(serde_json::Value::take);
        if let Some(elements) = elements {
            map.insert("element".to_string(), elements);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_derived_cardinality() {
        let required = ElementDefinition::new("Patient.name", 1, "*");
        assert!(required.is_required());
        assert!(!required.is_prohibited());
        assert_eq!(required.max_int(), None);

        let prohibited = ElementDefinition::new("Patient.photo", 0, "0");
        assert!(!prohibited.is_required());
        assert!(prohibited.is_prohibited());
        assert_eq!(prohibited.max_int(), Some(0));

        let bounded = ElementDefinition::new("Patient.gender", 0, "1");
        assert_eq!(bounded.max_int(), Some(1));
    }

    #[test]
    fn test_inconsistent_cardinality_is_kept() {
        let element = ElementDefinition::new("Patient.name", 3, "1");
        assert_eq!(element.min, 3);
        assert_eq!(element.max_int(), Some(1));
    }

    #[test]
    fn test_binding_strength_order() {
        assert!(BindingStrength::Required > BindingStrength::Extensible);
        assert!(BindingStrength::Extensible > BindingStrength::Preferred);
        assert!(BindingStrength::Preferred > BindingStrength::Example);
        assert_eq!(
            BindingStrength::parse_str("EXTENSIBLE"),
            Some(BindingStrength::Extensible)
        );
        assert_eq!(BindingStrength::parse_str("mandatory"), None);
    }

    #[test]
    fn test_structure_definition_from_json() {
        let json = r#"{
            "resourceType": "StructureDefinition",
            "url": "http://example.org/StructureDefinition/test-patient",
            "name": "TestPatient",
            "kind": "resource",
            "abstract": false,
            "type": "Patient",
            "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Patient",
            "element": [
                {"path": "Patient.name", "min": 1, "max": "*"},
                {
                    "path": "Patient.gender",
                    "max": "1",
                    "binding": {
                        "strength": "required",
                        "valueSet": "http://hl7.org/fhir/ValueSet/administrative-gender"
                    }
                }
            ]
        }"#;

        let schema = StructureDefinition::from_json(json).unwrap();
        assert_eq!(schema.type_name, "Patient");
        assert_eq!(schema.status, "active");
        assert_eq!(schema.kind, StructureKind::Resource);
        assert_eq!(schema.elements.len(), 2);

        let gender = schema.element("Patient.gender").unwrap();
        assert_eq!(gender.min, 0);
        assert_eq!(
            gender.binding.as_ref().map(|b| b.strength),
            Some(BindingStrength::Required)
        );
    }

    #[test]
    fn test_structure_definition_wrong_resource_type() {
        let json = r#"{"resourceType": "ValueSet", "url": "x", "name": "x", "kind": "resource", "type": "Patient"}"#;
        assert!(StructureDefinition::from_json(json).is_err());
    }

    #[test]
    fn test_snapshot_elements_and_typed_refs() {
        let json = r#"{
            "url": "http://example.org/StructureDefinition/obs",
            "name": "Obs",
            "kind": "resource",
            "type": "Observation",
            "snapshot": {
                "element": [
                    {"path": "Observation.status", "min": 1, "max": "1", "type": [{"code": "code"}]},
                    {"path": "Observation.code", "min": 1, "max": "1", "type": ["CodeableConcept"]}
                ]
            }
        }"#;

        let schema = StructureDefinition::from_json(json).unwrap();
        assert_eq!(schema.elements.len(), 2);
        assert_eq!(schema.elements[0].types, vec!["code".to_string()]);
        assert_eq!(schema.elements[1].types, vec!["CodeableConcept".to_string()]);
    }
}
