//! Path expression engine.
//!
//! A practical subset of FHIRPath used for invariant checks and ad-hoc
//! predicates over records:
//!
//! - [`tokenizer`] - lenient lexer
//! - [`parser`] - recursive-descent parser producing an [`Expression`]
//! - [`evaluator`] - tree-walking evaluator producing a [`Value`]
//!
//! Compiled expressions are memoized by [`FhirPathEngine`], so invariants
//! shared across many records are parsed once.
//!
//! # Example
//!
//! ```
//! use octofhir_conformance::fhirpath::{self, Value};
//! use serde_json::json;
//!
//! let record = json!({"name": [{"given": ["John"]}]});
//! assert!(fhirpath::evaluate_boolean("name.given.exists()", &record));
//! assert_eq!(fhirpath::evaluate("1 + 2", &json!({})), Value::Integer(3));
//! ```

pub mod evaluator;
pub mod parser;
pub mod tokenizer;
pub mod value;

pub use parser::{BinaryOp, Expression};
pub use tokenizer::Token;
pub use value::Value;

use moka::sync::Cache;
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Default capacity of the compiled expression cache
pub const DEFAULT_EXPRESSION_CACHE_SIZE: u64 = 512;

/// Evaluates path expressions, caching their parsed form.
#[derive(Clone)]
pub struct FhirPathEngine {
    cache: Cache<String, Arc<Expression>>,
}

impl FhirPathEngine {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_EXPRESSION_CACHE_SIZE)
    }

    /// Create an engine whose cache holds at most `max_capacity` expressions.
    pub fn with_cache_size(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Parse `source`, reusing a cached tree when available.
    pub fn compile(&self, source: &str) -> Arc<Expression> {
        if let Some(expression) = self.cache.get(source) {
            return expression;
        }
        let expression = Arc::new(parser::parse(source));
        self.cache.insert(source.to_string(), expression.clone());
        expression
    }

    /// Evaluate `source` with `record` as the root context.
    pub fn evaluate(&self, source: &str, record: &JsonValue) -> Value {
        self.evaluate_with_root(source, &Value::from_json(record))
    }

    /// Evaluate `source` against an already converted root value.
    pub fn evaluate_with_root(&self, source: &str, root: &Value) -> Value {
        evaluator::evaluate(&self.compile(source), root)
    }

    /// Evaluate `source` and apply truthiness to the result.
    pub fn evaluate_boolean(&self, source: &str, record: &JsonValue) -> bool {
        self.evaluate(source, record).is_truthy()
    }

    /// Number of compiled expressions currently cached
    pub fn cached_expressions(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn clear_cache(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FhirPathEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhirPathEngine")
            .field("cached_expressions", &self.cache.entry_count())
            .finish()
    }
}

static DEFAULT_ENGINE: Lazy<FhirPathEngine> = Lazy::new(FhirPathEngine::new);

/// Evaluate `source` against `record` using the shared default engine.
pub fn evaluate(source: &str, record: &JsonValue) -> Value {
    DEFAULT_ENGINE.evaluate(source, record)
}

/// Evaluate `source` against `record` and apply truthiness.
pub fn evaluate_boolean(source: &str, record: &JsonValue) -> bool {
    DEFAULT_ENGINE.evaluate_boolean(source, record)
}
