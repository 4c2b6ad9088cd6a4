use thiserror::Error;

/// Errors raised while loading definitions.
///
/// Validation itself never fails: every problem found in a record becomes a
/// [`FhirValidationIssue`](crate::FhirValidationIssue). These errors only come
/// out of the JSON loading surfaces for profiles and terminology.
#[derive(Error, Debug)]
pub enum ConformanceError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid definition: {message}")]
    InvalidDefinition { message: String },

    #[error("Unexpected resource type: expected {expected}, got {got}")]
    UnexpectedResourceType { expected: String, got: String },
}

pub type Result<T> = std::result::Result<T, ConformanceError>;

impl ConformanceError {
    pub fn invalid_definition<S: Into<String>>(message: S) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    pub fn unexpected_resource_type<S: Into<String>>(expected: S, got: S) -> Self {
        Self::UnexpectedResourceType {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Check that a JSON definition carries the expected `resourceType`, if any.
    pub(crate) fn check_resource_type(json: &serde_json::Value, expected: &str) -> Result<()> {
        match json.get("resourceType") {
            None => Ok(()),
            Some(serde_json::Value::String(rt)) if rt == expected => Ok(()),
            Some(serde_json::Value::String(rt)) => {
                Err(Self::unexpected_resource_type(expected, rt.as_str()))
            }
            Some(other) => Err(Self::invalid_definition(format!(
                "resourceType must be a string, found {other}"
            ))),
        }
    }
}
