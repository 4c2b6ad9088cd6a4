//! Element-level validators and the shared issue collector.
//!
//! All validators report into an [`IssueCollector`] instead of returning
//! errors; a validation step never fails.

pub mod binding;
pub mod cardinality;
pub mod collector;
pub mod profile;

pub use binding::TerminologyValidator;
pub use cardinality::CardinalityValidator;
pub use collector::{DEFAULT_MAX_ISSUES, IssueCollector};
pub use profile::ProfileValidator;

use serde_json::{Map, Value as JsonValue};

/// Strip the `"<RecordType>."` prefix from an element path.
///
/// Returns `None` for the root element itself or for paths rooted at a
/// different type.
pub fn relative_path<'a>(record_type: &str, path: &'a str) -> Option<&'a str> {
    path.strip_prefix(record_type)?
        .strip_prefix('.')
        .filter(|rest| !rest.is_empty())
}

/// Number of occurrences of `field`: array length, 1 for a present scalar,
/// 0 when absent or null.
pub fn count_occurrences(record: &Map<String, JsonValue>, field: &str) -> usize {
    match record.get(field) {
        None | Some(JsonValue::Null) => 0,
        Some(JsonValue::Array(items)) => items.len(),
        Some(_) => 1,
    }
}

/// Values reached by following a dotted `path` from `record`.
///
/// Arrays are flattened at every step and nulls are skipped, so
/// `name.given` yields every given name of every name.
pub fn values_at<'a>(record: &'a Map<String, JsonValue>, path: &str) -> Vec<&'a JsonValue> {
    let mut current: Vec<&JsonValue> = Vec::new();
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return current;
    };
    if let Some(value) = record.get(first) {
        push_flattened(&mut current, value);
    }

    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            if let Some(child) = value.as_object().and_then(|map| map.get(segment)) {
                push_flattened(&mut next, child);
            }
        }
        current = next;
    }
    current
}

fn push_flattened<'a>(out: &mut Vec<&'a JsonValue>, value: &'a JsonValue) {
    match value {
        JsonValue::Null => {}
        JsonValue::Array(items) => {
            for item in items {
                push_flattened(out, item);
            }
        }
        other => out.push(other),
    }
}

/// The record's `resourceType` as written, `None` when absent or null.
///
/// Unlike [`resource_type`] this keeps empty and non-string values, which
/// never equal a profile's type.
pub fn discriminant(record: &Map<String, JsonValue>) -> Option<&JsonValue> {
    record.get("resourceType").filter(|rt| !rt.is_null())
}

/// The record's `resourceType` discriminant, when it is a non-empty string.
pub fn resource_type(record: &Map<String, JsonValue>) -> Option<&str> {
    record
        .get("resourceType")
        .and_then(JsonValue::as_str)
        .filter(|rt| !rt.is_empty())
}
