use crate::fhirpath::DEFAULT_EXPRESSION_CACHE_SIZE;
use crate::validation::DEFAULT_MAX_ISSUES;
use serde::{Deserialize, Serialize};

/// Toggles and limits for a [`Validator`](crate::Validator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidatorConfig {
    /// Check the resourceType discriminant and the built-in required fields
    pub validate_structure: bool,
    /// Run registered profiles whose type matches the record
    pub validate_profiles: bool,
    /// Run applicable custom rules
    pub validate_custom_rules: bool,
    /// Warn about resource types that are neither built in nor profiled
    pub strict_resource_type_checking: bool,
    /// Issues retained per run; further issues are dropped
    pub max_issues: usize,
    /// Capacity of the compiled expression cache
    pub expression_cache_size: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            validate_structure: true,
            validate_profiles: true,
            validate_custom_rules: true,
            strict_resource_type_checking: false,
            max_issues: DEFAULT_MAX_ISSUES,
            expression_cache_size: DEFAULT_EXPRESSION_CACHE_SIZE,
        }
    }
}

impl ValidatorConfig {
    /// Default checks plus warnings for unknown resource types.
    pub fn strict() -> Self {
        Self {
            strict_resource_type_checking: true,
            ..Self::default()
        }
    }

    pub fn with_structure_validation(mut self, enabled: bool) -> Self {
        self.validate_structure = enabled;
        self
    }

    pub fn with_profile_validation(mut self, enabled: bool) -> Self {
        self.validate_profiles = enabled;
        self
    }

    pub fn with_custom_rules(mut self, enabled: bool) -> Self {
        self.validate_custom_rules = enabled;
        self
    }

    pub fn with_strict_resource_types(mut self, enabled: bool) -> Self {
        self.strict_resource_type_checking = enabled;
        self
    }

    pub fn with_max_issues(mut self, max_issues: usize) -> Self {
        self.max_issues = max_issues;
        self
    }

    pub fn with_expression_cache_size(mut self, size: u64) -> Self {
        self.expression_cache_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let lenient = ValidatorConfig::default();
        assert!(lenient.validate_structure && lenient.validate_profiles && lenient.validate_custom_rules);
        assert!(!lenient.strict_resource_type_checking);
        assert_eq!(lenient.max_issues, 1000);

        let strict = ValidatorConfig::strict();
        assert!(strict.strict_resource_type_checking);
        assert_eq!(strict.max_issues, lenient.max_issues);
    }

    #[test]
    fn test_builders() {
        let config = ValidatorConfig::default()
            .with_profile_validation(false)
            .with_max_issues(5);
        assert!(!config.validate_profiles);
        assert_eq!(config.max_issues, 5);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: ValidatorConfig =
            serde_json::from_str(r#"{"maxIssues": 10, "strictResourceTypeChecking": true}"#).unwrap();
        assert_eq!(config.max_issues, 10);
        assert!(config.strict_resource_type_checking);
        assert!(config.validate_structure);
    }
}
