use super::{IssueCollector, count_occurrences, relative_path};
use crate::types::{ElementDefinition, FhirValidationIssue, IssueCode, StructureDefinition};
use serde_json::{Map, Value as JsonValue};

/// Checks occurrence counts against element min/max bounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardinalityValidator;

impl CardinalityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check one element against an observed occurrence count.
    ///
    /// A prohibited element reports only the prohibition; min and max are not
    /// checked in that case.
    pub fn validate(&self, element: &ElementDefinition, count: usize, collector: &IssueCollector) {
        if element.is_prohibited() {
            if count > 0 {
                collector.add(
                    FhirValidationIssue::error(
                        IssueCode::Structure,
                        format!(
                            "Element '{}' is prohibited but occurs {count} time(s)",
                            element.path
                        ),
                    )
                    .with_expression(&element.path),
                );
            }
            return;
        }

        if count < element.min as usize {
            collector.add(
                FhirValidationIssue::error(
                    IssueCode::Required,
                    format!(
                        "Element '{}' requires at least {} occurrence(s), found {count}",
                        element.path, element.min
                    ),
                )
                .with_expression(&element.path),
            );
            return;
        }

        if let Some(max) = element.max_int().filter(|max| count > *max as usize) {
            collector.add(
                FhirValidationIssue::error(
                    IssueCode::Structure,
                    format!(
                        "Element '{}' allows at most {max} occurrence(s), found {count}",
                        element.path
                    ),
                )
                .with_expression(&element.path),
            );
        }
    }

    /// Check every direct child element of `profile` against `record`.
    ///
    /// Elements that are not one level below the profile's type are skipped.
    pub fn validate_record(
        &self,
        profile: &StructureDefinition,
        record: &Map<String, JsonValue>,
        collector: &IssueCollector,
    ) {
        for element in &profile.elements {
            let Some(field) = Self::field_name(&profile.type_name, &element.path) else {
                continue;
            };
            self.validate(element, count_occurrences(record, field), collector);
        }
    }

    /// Top-level field addressed by `path`, if it is a direct child of
    /// `record_type`.
    pub fn field_name<'a>(record_type: &str, path: &'a str) -> Option<&'a str> {
        relative_path(record_type, path).filter(|field| !field.contains('.'))
    }
}
