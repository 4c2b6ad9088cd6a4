use crate::types::{FhirValidationIssue, FhirValidationOutcome};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Default cap on issues retained by one validation run
pub const DEFAULT_MAX_ISSUES: usize = 1000;

/// Bounded, thread-safe sink for the issues of one validation run.
///
/// Appends go through `&self`, so sub-validators may share one collector
/// across threads. Once `max_issues` issues are stored, further issues are
/// dropped silently.
#[derive(Debug)]
pub struct IssueCollector {
    issues: Mutex<Vec<FhirValidationIssue>>,
    max_issues: usize,
    overflowed: AtomicBool,
}

impl IssueCollector {
    pub fn new(max_issues: usize) -> Self {
        Self {
            issues: Mutex::new(Vec::new()),
            max_issues,
            overflowed: AtomicBool::new(false),
        }
    }

    /// Append an issue. Returns `false` when the cap dropped it.
    pub fn add(&self, issue: FhirValidationIssue) -> bool {
        let mut issues = self.issues.lock();
        if issues.len() >= self.max_issues {
            drop(issues);
            if !self.overflowed.swap(true, Ordering::Relaxed) {
                warn!(max_issues = self.max_issues, "issue limit reached, dropping further issues");
            }
            return false;
        }
        issues.push(issue);
        true
    }

    pub fn extend<I: IntoIterator<Item = FhirValidationIssue>>(&self, issues: I) {
        for issue in issues {
            if !self.add(issue) {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.issues.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.lock().is_empty()
    }

    pub fn max_issues(&self) -> usize {
        self.max_issues
    }

    /// Whether the cap has been reached
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_issues
    }

    /// Whether any issue was dropped because of the cap
    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    /// Whether any retained issue is an error or fatal
    pub fn has_errors(&self) -> bool {
        self.issues.lock().iter().any(FhirValidationIssue::is_error)
    }

    /// Copy the current issues into an outcome, leaving the collector usable.
    pub fn snapshot(&self) -> FhirValidationOutcome {
        FhirValidationOutcome::from_issues(self.issues.lock().clone())
    }

    pub fn into_outcome(self) -> FhirValidationOutcome {
        FhirValidationOutcome::from_issues(self.issues.into_inner())
    }
}

impl Default for IssueCollector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ISSUES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssueCode;
    use std::sync::Arc;

    #[test]
    fn test_cap_drops_silently() {
        let collector = IssueCollector::new(3);
        let accepted = (0..10)
            .filter(|i| collector.add(FhirValidationIssue::warning(IssueCode::Value, format!("issue {i}"))))
            .count();
        assert_eq!(accepted, 3);
        assert_eq!(collector.len(), 3);
        assert!(collector.is_full());
        assert!(collector.overflowed());
        assert!(!collector.has_errors());

        let outcome = collector.into_outcome();
        assert_eq!(outcome.issues()[2].details, "issue 2");
        assert!(outcome.is_truncated(3));
    }

    #[test]
    fn test_has_errors_reflects_retained_issues() {
        let collector = IssueCollector::new(1);
        collector.add(FhirValidationIssue::information(IssueCode::Processing, "note"));
        collector.add(FhirValidationIssue::error(IssueCode::Required, "dropped"));
        assert!(!collector.has_errors());
    }

    #[test]
    fn test_zero_cap() {
        let collector = IssueCollector::new(0);
        assert!(!collector.add(FhirValidationIssue::error(IssueCode::Invalid, "x")));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_concurrent_appends() {
        let collector = Arc::new(IssueCollector::new(50));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for i in 0..20 {
                        collector.add(FhirValidationIssue::error(
                            IssueCode::Structure,
                            format!("thread {t} issue {i}"),
                        ));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(collector.len(), 50);
        assert!(collector.has_errors());
    }
}
