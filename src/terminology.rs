//! Terminology services for binding validation.
//!
//! Code validation goes through the [`TerminologyService`] trait so the
//! validators never depend on where vocabularies come from:
//!
//! - [`InMemoryTerminologyService`] holds code systems and value sets loaded at
//!   startup (optionally pre-seeded with a few standard value sets)
//! - [`CachedTerminologyService`] wraps any service with TTL-based caching of
//!   `validate_code` results
//!
//! An unknown value set cannot be validated against, so it is treated as
//! valid. Callers that need fail-closed behavior can check
//! [`TerminologyService::value_set`] first.
//!
//! # Example
//!
//! ```
//! use octofhir_conformance::terminology::{
//!     CacheConfig, CachedTerminologyService, InMemoryTerminologyService, TerminologyService,
//! };
//! use std::sync::Arc;
//!
//! let service = Arc::new(InMemoryTerminologyService::with_standard_value_sets());
//! let cached = CachedTerminologyService::new(service, CacheConfig::short_lived());
//!
//! let gender = "http://hl7.org/fhir/ValueSet/administrative-gender";
//! assert!(cached.validate_code(None, "female", gender));
//! assert!(!cached.validate_code(None, "f", gender));
//! ```

use crate::error::{ConformanceError, Result};
use moka::sync::Cache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A concept of a code system, possibly with nested child concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(rename = "concept", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Concept>,
}

impl Concept {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: None,
            children: Vec::new(),
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    fn find(&self, code: &str) -> Option<&Concept> {
        if self.code == code {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(code))
    }
}

/// A code system: the vocabulary that defines a set of codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemDefinition {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "concept", default)]
    pub concepts: Vec<Concept>,
}

impl CodeSystemDefinition {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            version: None,
            concepts: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_concept(mut self, concept: Concept) -> Self {
        self.concepts.push(concept);
        self
    }

    /// Add plain concepts for each of `codes`.
    pub fn with_codes(mut self, codes: &[&str]) -> Self {
        self.concepts.extend(codes.iter().map(|c| Concept::new(*c)));
        self
    }

    /// Find a concept anywhere in the hierarchy.
    pub fn concept(&self, code: &str) -> Option<&Concept> {
        self.concepts.iter().find_map(|c| c.find(code))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.concept(code).is_some()
    }

    pub fn display(&self, code: &str) -> Option<&str> {
        self.concept(code)?.display.as_deref()
    }

    /// Load a `CodeSystem` resource.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        ConformanceError::check_resource_type(&value, "CodeSystem")?;
        let definition: Self = serde_json::from_value(value)?;
        if definition.url.is_empty() {
            return Err(ConformanceError::invalid_definition(
                "CodeSystem url must not be empty",
            ));
        }
        Ok(definition)
    }
}

/// One `compose.include` entry of a value set.
///
/// Without explicit concepts the include covers every concept of `system`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSetInclude {
    pub system: String,
    #[serde(rename = "concept", default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<Concept>,
}

impl ValueSetInclude {
    pub fn whole_system(system: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            concepts: Vec::new(),
        }
    }

    pub fn codes(system: impl Into<String>, codes: &[&str]) -> Self {
        Self {
            system: system.into(),
            concepts: codes.iter().map(|c| Concept::new(*c)).collect(),
        }
    }

    pub fn is_whole_system(&self) -> bool {
        self.concepts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSetCompose {
    #[serde(default)]
    pub include: Vec<ValueSetInclude>,
}

/// A value set: the codes allowed by a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetDefinition {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub compose: ValueSetCompose,
}

impl ValueSetDefinition {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: None,
            version: None,
            compose: ValueSetCompose::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_include(mut self, include: ValueSetInclude) -> Self {
        self.compose.include.push(include);
        self
    }

    pub fn includes(&self) -> &[ValueSetInclude] {
        &self.compose.include
    }

    /// Load a `ValueSet` resource.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        ConformanceError::check_resource_type(&value, "ValueSet")?;
        let definition: Self = serde_json::from_value(value)?;
        if definition.url.is_empty() {
            return Err(ConformanceError::invalid_definition(
                "ValueSet url must not be empty",
            ));
        }
        Ok(definition)
    }
}

/// Source of code systems and value sets.
///
/// Implementations must be pure with respect to their registered content:
/// validating the same `(system, code, value_set_url)` twice yields the same
/// answer until the content changes.
pub trait TerminologyService: Send + Sync {
    fn code_system(&self, url: &str) -> Option<Arc<CodeSystemDefinition>>;

    fn value_set(&self, url: &str) -> Option<Arc<ValueSetDefinition>>;

    /// Whether `code` (optionally from `system`) is a member of the value set.
    ///
    /// The default implementation resolves membership from the value set's
    /// includes. An unknown value set, or an include over an unknown code
    /// system, cannot be checked and counts as valid.
    fn validate_code(&self, system: Option<&str>, code: &str, value_set_url: &str) -> bool {
        let Some(value_set) = self.value_set(value_set_url) else {
            debug!(value_set = value_set_url, "unknown value set, accepting code");
            return true;
        };

        value_set
            .includes()
            .iter()
            .filter(|include| system.is_none_or(|s| s == include.system))
            .any(|include| {
                if !include.is_whole_system() {
                    return include.concepts.iter().any(|c| c.code == code);
                }
                match self.code_system(&include.system) {
                    Some(code_system) => code_system.contains(code),
                    None => {
                        trace!(system = %include.system, "unknown code system, accepting code");
                        true
                    }
                }
            })
    }
}

#[derive(Debug, Default)]
struct TerminologyStore {
    code_systems: HashMap<String, Arc<CodeSystemDefinition>>,
    value_sets: HashMap<String, Arc<ValueSetDefinition>>,
}

/// Terminology service holding its definitions in memory.
///
/// Both maps live behind one lock, so a reader never sees a value set
/// without the code system registered alongside it.
#[derive(Debug, Default)]
pub struct InMemoryTerminologyService {
    store: RwLock<TerminologyStore>,
}

impl InMemoryTerminologyService {
    /// Create a new empty service
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service seeded with common base value sets.
    pub fn with_standard_value_sets() -> Self {
        let service = Self::new();
        for (name, codes) in STANDARD_VOCABULARIES {
            let system = format!("http://hl7.org/fhir/{name}");
            let value_set = format!("http://hl7.org/fhir/ValueSet/{name}");
            service.add_code_system(
                CodeSystemDefinition::new(&system)
                    .with_name(*name)
                    .with_codes(codes),
            );
            service.add_value_set(
                ValueSetDefinition::new(value_set)
                    .with_name(*name)
                    .with_include(ValueSetInclude::whole_system(system)),
            );
        }
        service
    }

    pub fn add_code_system(&self, code_system: CodeSystemDefinition) {
        debug!(url = %code_system.url, concepts = code_system.concepts.len(), "registering code system");
        self.store
            .write()
            .code_systems
            .insert(code_system.url.clone(), Arc::new(code_system));
    }

    pub fn add_value_set(&self, value_set: ValueSetDefinition) {
        debug!(url = %value_set.url, "registering value set");
        self.store
            .write()
            .value_sets
            .insert(value_set.url.clone(), Arc::new(value_set));
    }

    /// Load and register a `CodeSystem` resource.
    pub fn add_code_system_json(&self, json: &str) -> Result<()> {
        self.add_code_system(CodeSystemDefinition::from_json(json)?);
        Ok(())
    }

    /// Load and register a `ValueSet` resource.
    pub fn add_value_set_json(&self, json: &str) -> Result<()> {
        self.add_value_set(ValueSetDefinition::from_json(json)?);
        Ok(())
    }

    /// Add a code to a value set, creating the value set if needed.
    pub fn add_code(&self, value_set_url: &str, system: &str, code: &str) {
        let mut store = self.store.write();
        let entry = store
            .value_sets
            .entry(value_set_url.to_string())
            .or_insert_with(|| Arc::new(ValueSetDefinition::new(value_set_url)));
        let value_set = Arc::make_mut(entry);
        match value_set
            .compose
            .include
            .iter_mut()
            .find(|i| i.system == system && !i.is_whole_system())
        {
            Some(include) => include.concepts.push(Concept::new(code)),
            None => value_set
                .compose
                .include
                .push(ValueSetInclude::codes(system, &[code])),
        }
    }

    pub fn remove_value_set(&self, url: &str) -> bool {
        self.store.write().value_sets.remove(url).is_some()
    }

    pub fn remove_code_system(&self, url: &str) -> bool {
        self.store.write().code_systems.remove(url).is_some()
    }

    pub fn value_set_count(&self) -> usize {
        self.store.read().value_sets.len()
    }

    pub fn code_system_count(&self) -> usize {
        self.store.read().code_systems.len()
    }
}

impl TerminologyService for InMemoryTerminologyService {
    fn code_system(&self, url: &str) -> Option<Arc<CodeSystemDefinition>> {
        self.store.read().code_systems.get(url).cloned()
    }

    fn value_set(&self, url: &str) -> Option<Arc<ValueSetDefinition>> {
        self.store.read().value_sets.get(url).cloned()
    }
}

const STANDARD_VOCABULARIES: &[(&str, &[&str])] = &[
    ("administrative-gender", &["male", "female", "other", "unknown"]),
    (
        "observation-status",
        &[
            "registered",
            "preliminary",
            "final",
            "amended",
            "corrected",
            "cancelled",
            "entered-in-error",
            "unknown",
        ],
    ),
    (
        "request-status",
        &[
            "draft",
            "active",
            "on-hold",
            "revoked",
            "completed",
            "entered-in-error",
            "unknown",
        ],
    ),
    (
        "name-use",
        &["usual", "official", "temp", "nickname", "anonymous", "old", "maiden"],
    ),
    (
        "contact-point-system",
        &["phone", "fax", "email", "pager", "url", "sms", "other"],
    ),
];

/// Configuration for the terminology cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Time-to-live for cached validation results
    pub ttl: Duration,
    /// Maximum number of entries in the cache
    pub max_size: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_size: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn new(ttl: Duration, max_size: u64) -> Self {
        Self { ttl, max_size }
    }

    /// 5 minutes, 1000 entries
    pub fn short_lived() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_size: 1_000,
        }
    }

    /// 24 hours, 50000 entries
    pub fn long_lived() -> Self {
        Self {
            ttl: Duration::from_secs(86400),
            max_size: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    value_set_url: String,
    code: String,
    system: Option<String>,
}

/// A cached wrapper around a [`TerminologyService`].
///
/// Only `validate_code` results are cached; definition lookups go straight
/// to the inner service.
pub struct CachedTerminologyService {
    inner: Arc<dyn TerminologyService>,
    cache: Cache<CacheKey, bool>,
}

impl CachedTerminologyService {
    pub fn new(inner: Arc<dyn TerminologyService>, config: CacheConfig) -> Self {
        let cache = Cache::builder()
            .time_to_live(config.ttl)
            .max_capacity(config.max_size)
            .build();

        Self { inner, cache }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        CacheStats {
            entry_count: self.cache.entry_count(),
            weighted_size: self.cache.weighted_size(),
        }
    }

    /// Clear all cached entries
    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for CachedTerminologyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedTerminologyService")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: u64,
    pub weighted_size: u64,
}

impl TerminologyService for CachedTerminologyService {
    fn code_system(&self, url: &str) -> Option<Arc<CodeSystemDefinition>> {
        self.inner.code_system(url)
    }

    fn value_set(&self, url: &str) -> Option<Arc<ValueSetDefinition>> {
        self.inner.value_set(url)
    }

    fn validate_code(&self, system: Option<&str>, code: &str, value_set_url: &str) -> bool {
        let key = CacheKey {
            value_set_url: value_set_url.to_string(),
            code: code.to_string(),
            system: system.map(str::to_string),
        };
        if let Some(valid) = self.cache.get(&key) {
            return valid;
        }

        let valid = self.inner.validate_code(system, code, value_set_url);
        self.cache.insert(key, valid);
        valid
    }
}
