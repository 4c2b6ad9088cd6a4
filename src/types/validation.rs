//! Validation result types.
//!
//! - [`FhirValidationIssue`] - one reported conformance problem
//! - [`FhirValidationOutcome`] - the immutable result of one validation run

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Issue severity levels, totally ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Information,
    Warning,
    Error,
    Fatal,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Information => "information",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
            IssueSeverity::Fatal => "fatal",
        }
    }

    /// Whether an issue of this severity makes the outcome invalid
    pub fn is_error(&self) -> bool {
        *self >= IssueSeverity::Error
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCode {
    /// Cardinality or prohibition violation
    Structure,
    /// Missing mandatory field
    Required,
    /// Malformed or empty scalar
    Value,
    /// Failed constraint expression
    Invariant,
    /// Internal failure to interpret input
    Processing,
    /// Custom co-occurrence violation
    BusinessRule,
    /// Terminology mismatch
    CodeInvalid,
    NotFound,
    TooLong,
    Invalid,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::Structure => "structure",
            IssueCode::Required => "required",
            IssueCode::Value => "value",
            IssueCode::Invariant => "invariant",
            IssueCode::Processing => "processing",
            IssueCode::BusinessRule => "business-rule",
            IssueCode::CodeInvalid => "code-invalid",
            IssueCode::NotFound => "not-found",
            IssueCode::TooLong => "too-long",
            IssueCode::Invalid => "invalid",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conformance problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FhirValidationIssue {
    pub severity: IssueSeverity,
    pub code: IssueCode,
    /// Human-readable message
    pub details: String,
    /// Path to the offending element
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Key of the violated invariant, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint_key: Option<String>,
}

impl FhirValidationIssue {
    pub fn new(severity: IssueSeverity, code: IssueCode, details: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            details: details.into(),
            expression: None,
            constraint_key: None,
        }
    }

    pub fn fatal(code: IssueCode, details: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Fatal, code, details)
    }

    pub fn error(code: IssueCode, details: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, details)
    }

    pub fn warning(code: IssueCode, details: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, code, details)
    }

    pub fn information(code: IssueCode, details: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Information, code, details)
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_constraint_key(mut self, key: impl Into<String>) -> Self {
        self.constraint_key = Some(key.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity.is_error()
    }
}

impl std::fmt::Display for FhirValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.code, self.details)?;
        if let Some(expression) = &self.expression {
            write!(f, " (at {expression})")?;
        }
        Ok(())
    }
}

/// Immutable snapshot of the issues found by one validation run.
///
/// Issues keep the order in which they were collected; [`ranked`](Self::ranked)
/// gives the most severe first.
///
/// # Example
/// ```ignore
/// let outcome = validator.validate(&resource);
/// if !outcome.is_valid() {
///     for issue in outcome.errors() {
///         eprintln!("{issue}");
///     }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FhirValidationOutcome {
    issues: Vec<FhirValidationIssue>,
}

impl FhirValidationOutcome {
    pub fn from_issues(issues: Vec<FhirValidationIssue>) -> Self {
        Self { issues }
    }

    /// An outcome with no issues
    pub fn success() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> &[FhirValidationIssue] {
        &self.issues
    }

    pub fn into_issues(self) -> Vec<FhirValidationIssue> {
        self.issues
    }

    /// No issue with severity error or fatal
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(FhirValidationIssue::is_error)
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Error and fatal issues
    pub fn errors(&self) -> Vec<&FhirValidationIssue> {
        self.issues.iter().filter(|i| i.is_error()).collect()
    }

    pub fn warnings(&self) -> Vec<&FhirValidationIssue> {
        self.with_severity(IssueSeverity::Warning)
    }

    pub fn information(&self) -> Vec<&FhirValidationIssue> {
        self.with_severity(IssueSeverity::Information)
    }

    fn with_severity(&self, severity: IssueSeverity) -> Vec<&FhirValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == severity)
            .collect()
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|i| i.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.with_severity(IssueSeverity::Warning).len()
    }

    pub fn information_count(&self) -> usize {
        self.with_severity(IssueSeverity::Information).len()
    }

    /// Issues at or above `severity`
    pub fn at_least(&self, severity: IssueSeverity) -> Vec<&FhirValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity >= severity)
            .collect()
    }

    /// Issues ordered most severe first; ties keep collection order.
    pub fn ranked(&self) -> Vec<&FhirValidationIssue> {
        let mut ranked: Vec<&FhirValidationIssue> = self.issues.iter().collect();
        ranked.sort_by(|a, b| b.severity.cmp(&a.severity));
        ranked
    }

    /// Whether the run stopped collecting because it hit `max_issues`.
    pub fn is_truncated(&self, max_issues: usize) -> bool {
        self.issues.len() >= max_issues
    }

    /// Render as an OperationOutcome resource.
    ///
    /// Severities and codes map by name. An outcome without issues renders a
    /// single informational "validation passed" entry.
    pub fn to_operation_outcome(&self) -> JsonValue {
        let issues: Vec<JsonValue> = if self.issues.is_empty() {
            vec![json!({
                "severity": IssueSeverity::Information.as_str(),
                "code": "informational",
                "details": { "text": "Validation passed" }
            })]
        } else {
            self.issues.iter().map(issue_to_json).collect()
        };

        json!({
            "resourceType": "OperationOutcome",
            "issue": issues
        })
    }
}

fn issue_to_json(issue: &FhirValidationIssue) -> JsonValue {
    let mut entry = json!({
        "severity": issue.severity.as_str(),
        "code": issue.code.as_str(),
        "details": { "text": issue.details }
    });
    if let Some(expression) = &issue.expression {
        entry["expression"] = json!([expression]);
    }
    if let Some(key) = &issue.constraint_key {
        entry["extension"] = json!([{
            "url": "http://hl7.org/fhir/StructureDefinition/operationoutcome-issue-source",
            "valueString": key
        }]);
    }
    entry
}

impl From<Vec<FhirValidationIssue>> for FhirValidationOutcome {
    fn from(issues: Vec<FhirValidationIssue>) -> Self {
        Self::from_issues(issues)
    }
}
