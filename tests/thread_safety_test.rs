mod common;

use common::{named_patient_profile, patient_profile, valid_observation, valid_patient};
use octofhir_conformance::{
    CacheConfig, CachedTerminologyService, CustomRule, FhirPathEngine, InMemoryTerminologyService,
    IssueCollector, RuleRegistry, TerminologyService, Validator,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

#[test]
fn test_shared_types_are_send_sync() {
    // Compile-time checks: these fail to build if a type loses Send + Sync
    fn assert_send_sync<T: Send + Sync>() {}

    assert_send_sync::<Validator>();
    assert_send_sync::<RuleRegistry>();
    assert_send_sync::<IssueCollector>();
    assert_send_sync::<FhirPathEngine>();
    assert_send_sync::<InMemoryTerminologyService>();
    assert_send_sync::<CachedTerminologyService>();
    assert_send_sync::<Arc<dyn TerminologyService>>();
}

#[test]
fn test_multithreaded_validation() {
    let validator = Arc::new(Validator::new());
    validator.register_profile(patient_profile());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let validator = Arc::clone(&validator);
            thread::spawn(move || {
                let mut errors = 0;
                for _ in 0..50 {
                    errors += validator.validate(&valid_patient()).error_count();
                    errors += validator.validate(&valid_observation()).error_count();
                    let missing_name = validator.validate(&json!({"resourceType": "Patient"}));
                    assert_eq!(missing_name.error_count(), 1);
                }
                errors
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0);
    }
}

#[test]
fn test_registration_during_validation() {
    let validator = Arc::new(Validator::new());
    validator.register_profile(patient_profile());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let validator = Arc::clone(&validator);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..200 {
                if i % 2 == 0 {
                    validator.register_profile(named_patient_profile());
                    validator.register_rule(
                        CustomRule::required_fields("patient-active", &["active"]).for_types(&["Patient"]),
                    );
                } else {
                    validator.remove_profile(&named_patient_profile().url);
                    validator.remove_rule("patient-active");
                }
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let validator = Arc::clone(&validator);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut runs = 0usize;
                // a valid patient passes whichever profiles and rules are present
                while !done.load(Ordering::SeqCst) || runs < 10 {
                    let outcome = validator.validate(&valid_patient());
                    assert!(outcome.is_valid(), "unexpected issues: {:?}", outcome.issues());
                    runs += 1;
                }
                runs
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        assert!(reader.join().unwrap() >= 10);
    }
    assert_eq!(validator.profile_count(), 1);
    assert!(validator.rules().is_empty());
}

#[test]
fn test_shared_collector_across_threads() {
    let collector = Arc::new(IssueCollector::new(100));
    let validator = Arc::new(Validator::new());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let collector = Arc::clone(&collector);
            let validator = Arc::clone(&validator);
            thread::spawn(move || {
                for _ in 0..50 {
                    // each record is missing status and code
                    let outcome = validator.validate(&json!({"resourceType": "Observation"}));
                    collector.extend(outcome.into_issues());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(collector.len(), 100);
    assert!(collector.overflowed());
}

#[test]
fn test_cached_terminology_across_threads() {
    let inner = Arc::new(InMemoryTerminologyService::with_standard_value_sets());
    let cached = Arc::new(CachedTerminologyService::new(inner, CacheConfig::short_lived()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let cached = Arc::clone(&cached);
            thread::spawn(move || {
                for code in ["male", "female", "other", "unknown", "robot"] {
                    let valid = cached.validate_code(
                        None,
                        code,
                        "http://hl7.org/fhir/ValueSet/administrative-gender",
                    );
                    assert_eq!(valid, code != "robot", "thread {i}, code {code}");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_engine_clones_share_cache() {
    let engine = FhirPathEngine::new();
    let record = valid_patient();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let record = record.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    assert!(engine.evaluate_boolean("name.given.exists()", &record));
                    assert!(!engine.evaluate_boolean("deceasedBoolean.exists()", &record));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(engine.cached_expressions(), 2);
}
