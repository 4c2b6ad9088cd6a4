//! Runtime values of the path expression language.

use rust_decimal::Decimal;
use serde_json::{Map, Value as JsonValue};
use std::str::FromStr;

/// A value produced by evaluating a path expression.
///
/// Records enter the evaluator as [`Value::Object`]; navigating into them
/// yields scalars, nested objects or flattened collections.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The empty collection
    Empty,
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    /// A date/time kept in its literal text form
    DateTime(String),
    /// A complex element (nested mapping)
    Object(Map<String, JsonValue>),
    /// Flat collection; never nested, never contains `Empty`
    Collection(Vec<Value>),
}

impl Value {
    /// Convert a JSON value. Arrays become collections, `null` becomes `Empty`.
    pub fn from_json(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Empty,
            JsonValue::Bool(b) => Value::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => parse_decimal(&n.to_string())
                    .map(Value::Decimal)
                    .unwrap_or(Value::Empty),
            },
            JsonValue::String(s) => Value::String(s.clone()),
            JsonValue::Array(items) => Value::collection(items.iter().map(Value::from_json)),
            JsonValue::Object(map) => Value::Object(map.clone()),
        }
    }

    /// Build a flat collection, dropping empties. Zero items yield `Empty`.
    pub fn collection<I: IntoIterator<Item = Value>>(items: I) -> Self {
        let mut flat = Vec::new();
        for item in items {
            match item {
                Value::Empty => {}
                Value::Collection(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.is_empty() {
            Value::Empty
        } else {
            Value::Collection(flat)
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Collection(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Boolean(b) => *b,
            Value::String(s) => !s.is_empty(),
            Value::Integer(i) => *i != 0,
            Value::Decimal(d) => !d.is_zero(),
            Value::DateTime(_) => true,
            Value::Object(_) => true,
            Value::Collection(items) => !items.is_empty(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Value::Empty => 0,
            Value::Collection(items) => items.len(),
            _ => 1,
        }
    }

    /// The single item of this value: itself for scalars, the only item of a
    /// one-element collection, `None` otherwise.
    pub fn singleton(&self) -> Option<&Value> {
        match self {
            Value::Empty => None,
            Value::Collection(items) if items.len() == 1 => items[0].singleton(),
            Value::Collection(_) => None,
            other => Some(other),
        }
    }

    /// Whether this is a primitive (non-complex, non-collection) value
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::String(_)
                | Value::Integer(_)
                | Value::Decimal(_)
                | Value::Boolean(_)
                | Value::DateTime(_)
        )
    }

    /// Textual form of a singleton primitive.
    pub fn string_repr(&self) -> Option<String> {
        match self.singleton()? {
            Value::String(s) | Value::DateTime(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Numeric form of a singleton, parsing numeric strings.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.singleton()? {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            Value::String(s) => parse_decimal(s.trim()),
            _ => None,
        }
    }

    /// Navigate to a child field. Collections map the lookup over every item.
    pub fn navigate(&self, name: &str) -> Value {
        match self {
            Value::Object(map) => map.get(name).map(Value::from_json).unwrap_or(Value::Empty),
            Value::Collection(items) => Value::collection(items.iter().map(|i| i.navigate(name))),
            _ => Value::Empty,
        }
    }

    /// Name of the variant, as used by `is()`/`as()`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "Empty",
            Value::String(_) => "String",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::Boolean(_) => "Boolean",
            Value::DateTime(_) => "DateTime",
            Value::Object(_) => "Object",
            Value::Collection(_) => "Collection",
        }
    }

    /// Collapse one-element collections so `['a'] = 'a'` compares equal.
    pub(crate) fn normalized(&self) -> Value {
        match self {
            Value::Collection(items) if items.len() == 1 => items[0].normalized(),
            other => other.clone(),
        }
    }
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&JsonValue> for Value {
    fn from(json: &JsonValue) -> Self {
        Value::from_json(json)
    }
}
