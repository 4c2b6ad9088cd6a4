//! Path expression evaluation over realistic records.

use octofhir_conformance::fhirpath::{self, FhirPathEngine, Value};
use rust_decimal::Decimal;
use serde_json::json;

fn patient() -> serde_json::Value {
    json!({
        "resourceType": "Patient",
        "active": true,
        "name": [
            {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
            {"use": "usual", "given": ["Jim"]}
        ],
        "telecom": [
            {"system": "phone", "value": "(03) 5555 6473"},
            {"system": "email", "value": "peter@example.org"}
        ],
        "birthDate": "1974-12-25",
        "multipleBirthInteger": 2
    })
}

#[test]
fn test_navigation_flattens_collections() {
    let record = patient();
    assert_eq!(fhirpath::evaluate("name.given.count()", &record), Value::Integer(3));
    assert_eq!(
        fhirpath::evaluate("name.family", &record),
        Value::Collection(vec![Value::String("Chalmers".into())])
    );
    assert_eq!(fhirpath::evaluate("Patient.telecom.value.count()", &record), Value::Integer(2));
    assert_eq!(fhirpath::evaluate("name.suffix", &record), Value::Empty);
}

#[test]
fn test_invariant_style_expressions() {
    let record = patient();
    assert!(fhirpath::evaluate_boolean("name.exists() and birthDate.exists()", &record));
    assert!(fhirpath::evaluate_boolean("telecom.exists() implies name.exists()", &record));
    assert!(fhirpath::evaluate_boolean("deceased.exists().not()", &record));
    assert!(fhirpath::evaluate_boolean("not deceasedBoolean.exists()", &record));
    assert!(fhirpath::evaluate_boolean("multipleBirthInteger >= 2", &record));
    assert!(!fhirpath::evaluate_boolean("multipleBirthInteger > 2", &record));
    assert!(fhirpath::evaluate_boolean("active = true xor active = false", &record));
}

#[test]
fn test_string_functions_on_record() {
    let record = patient();
    assert!(fhirpath::evaluate_boolean("birthDate.startsWith('1974')", &record));
    assert!(fhirpath::evaluate_boolean(
        "birthDate.matches('^[0-9]{4}-[0-9]{2}-[0-9]{2}$')",
        &record
    ));
    assert_eq!(fhirpath::evaluate("birthDate.length()", &record), Value::Integer(10));
    // several values: not a singleton, so the test cannot apply
    assert_eq!(fhirpath::evaluate("telecom.value.contains('@')", &record), Value::Empty);
}

#[test]
fn test_literals() {
    let empty = json!({});
    assert_eq!(
        fhirpath::evaluate("@2024-01-15", &empty),
        Value::DateTime("2024-01-15".into())
    );
    assert!(fhirpath::evaluate_boolean("@2024-01-15", &empty));
    assert_eq!(fhirpath::evaluate("0.5 + 0.25", &empty), Value::Decimal(Decimal::new(75, 2)));
    assert_eq!(fhirpath::evaluate("'it\\'s'", &empty), Value::String("it's".into()));
}

#[test]
fn test_malformed_expressions_degrade() {
    let record = patient();
    for source in ["", ".", "name.", "(((", "name.exists() )", "= = =", "'unterminated", "#$%"] {
        // must not panic
        let _ = fhirpath::evaluate(source, &record);
    }
    assert!(fhirpath::evaluate_boolean("name.exists() ;;", &record));
    assert_eq!(fhirpath::evaluate("'a' > 'b'", &record), Value::Empty);
}

#[test]
fn test_deep_nesting_does_not_overflow() {
    let record = json!({});
    let nested = format!("{}true{}", "(".repeat(10_000), ")".repeat(10_000));
    assert!(!fhirpath::evaluate_boolean(&nested, &record));

    let shallow = format!("{}true{}", "(".repeat(50), ")".repeat(50));
    assert!(fhirpath::evaluate_boolean(&shallow, &record));

    let chain = vec!["true"; 20_000].join(" and ");
    assert!(fhirpath::evaluate_boolean(&chain, &record));
}

#[test]
fn test_where_is_not_a_filter() {
    let record = patient();
    // all three given names come back even though none match
    assert_eq!(
        fhirpath::evaluate("name.given.where($this = 'Nobody').count()", &record),
        Value::Integer(3)
    );
    assert!(!fhirpath::evaluate_boolean("identifier.where(system = 'x').exists()", &record));
}

#[test]
fn test_engine_instances_share_nothing() {
    let a = FhirPathEngine::with_cache_size(4);
    let b = FhirPathEngine::with_cache_size(4);
    a.compile("name.exists()");
    assert_eq!(a.cached_expressions(), 1);
    assert_eq!(b.cached_expressions(), 0);
    assert!(a.evaluate_boolean("name.exists()", &patient()));
}
