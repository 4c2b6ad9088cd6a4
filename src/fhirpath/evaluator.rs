//! Tree-walking evaluator.
//!
//! Evaluation never fails: unknown fields and functions, type mismatches and
//! incomparable operands all produce [`Value::Empty`].

use regex::Regex;
use rust_decimal::Decimal;
use std::cell::Cell;

use super::parser::{BinaryOp, Expression, MAX_DEPTH};
use super::tokenizer::is_date_time_literal;
use super::value::Value;

/// Evaluate `expression` against `root`, usually a [`Value::Object`] record.
///
/// Subtrees nested deeper than [`MAX_DEPTH`] evaluate to [`Value::Empty`].
pub fn evaluate(expression: &Expression, root: &Value) -> Value {
    Evaluator {
        root,
        depth: Cell::new(0),
    }
    .eval(expression)
}

struct Evaluator<'a> {
    root: &'a Value,
    depth: Cell<usize>,
}

impl Evaluator<'_> {
    fn eval(&self, expression: &Expression) -> Value {
        let depth = self.depth.get();
        if depth >= MAX_DEPTH {
            return Value::Empty;
        }
        self.depth.set(depth + 1);
        let value = self.eval_node(expression);
        self.depth.set(depth);
        value
    }

    fn eval_node(&self, expression: &Expression) -> Value {
        match expression {
            Expression::Empty => Value::Empty,
            Expression::Literal(value) => value.clone(),
            Expression::Identifier(name) => self.resolve_root(name),
            Expression::Member(target, name) => self.eval(target).navigate(name),
            Expression::Function { target, name, args } => {
                let input = match target {
                    Some(target) => self.eval(target),
                    None => self.root.clone(),
                };
                self.call(&input, name, args)
            }
            Expression::Not(operand) => Value::Boolean(!self.eval(operand).is_truthy()),
            Expression::Binary { op, left, right } => self.binary(*op, left, right),
        }
    }

    /// Root identifiers are fields of the record, except that the record's own
    /// type name (`Patient` on a Patient) resolves to the record itself.
    fn resolve_root(&self, name: &str) -> Value {
        if let Value::Object(map) = self.root {
            let is_own_type = name.starts_with(|c: char| c.is_ascii_uppercase())
                && map.get("resourceType").and_then(|rt| rt.as_str()) == Some(name);
            if is_own_type {
                return self.root.clone();
            }
        }
        self.root.navigate(name)
    }

    fn binary(&self, op: BinaryOp, left: &Expression, right: &Expression) -> Value {
        match op {
            BinaryOp::And => {
                if !self.eval(left).is_truthy() {
                    return Value::Boolean(false);
                }
                Value::Boolean(self.eval(right).is_truthy())
            }
            BinaryOp::Or => {
                if self.eval(left).is_truthy() {
                    return Value::Boolean(true);
                }
                Value::Boolean(self.eval(right).is_truthy())
            }
            BinaryOp::Implies => {
                if !self.eval(left).is_truthy() {
                    return Value::Boolean(true);
                }
                Value::Boolean(self.eval(right).is_truthy())
            }
            BinaryOp::Xor => {
                let l = self.eval(left).is_truthy();
                let r = self.eval(right).is_truthy();
                Value::Boolean(l != r)
            }
            BinaryOp::Equal => Value::Boolean(equals(&self.eval(left), &self.eval(right))),
            BinaryOp::NotEqual => Value::Boolean(!equals(&self.eval(left), &self.eval(right))),
            BinaryOp::GreaterThan
            | BinaryOp::LessThan
            | BinaryOp::GreaterThanOrEqual
            | BinaryOp::LessThanOrEqual => compare(op, &self.eval(left), &self.eval(right)),
            BinaryOp::Union => Value::collection([self.eval(left), self.eval(right)]),
            BinaryOp::Add => add(&self.eval(left), &self.eval(right)),
        }
    }

    fn call(&self, input: &Value, name: &str, args: &[Expression]) -> Value {
        match name {
            "exists" => Value::Boolean(!input.is_empty()),
            "empty" => Value::Boolean(input.is_empty()),
            "count" => Value::Integer(input.count() as i64),
            "hasValue" => Value::Boolean(input.singleton().is_some_and(Value::is_primitive)),
            "not" => Value::Boolean(!input.is_truthy()),
            "length" => match input.singleton() {
                Some(Value::String(s)) => Value::Integer(s.chars().count() as i64),
                _ => Value::Empty,
            },
            "startsWith" => self.string_test(input, args, |s, arg| s.starts_with(arg)),
            "endsWith" => self.string_test(input, args, |s, arg| s.ends_with(arg)),
            "contains" => self.string_test(input, args, |s, arg| s.contains(arg)),
            "matches" => {
                let Some(pattern) = self.string_arg(args) else {
                    return Value::Empty;
                };
                match Regex::new(&pattern) {
                    Ok(re) => self.string_test(input, args, |s, _| re.is_match(s)),
                    Err(_) => Value::Empty,
                }
            }
            // Filtering is not implemented: the criteria are never evaluated.
            "where" => {
                if input.is_truthy() {
                    input.clone()
                } else {
                    Value::Empty
                }
            }
            "all" => Value::Boolean(input.is_truthy()),
            "is" => match type_arg(args) {
                Some(type_name) => Value::Boolean(
                    input
                        .singleton()
                        .is_some_and(|v| is_of_type(v, type_name)),
                ),
                None => Value::Empty,
            },
            "as" => match (type_arg(args), input.singleton()) {
                (Some(type_name), Some(v)) if is_of_type(v, type_name) => v.clone(),
                _ => Value::Empty,
            },
            _ => Value::Empty,
        }
    }

    fn string_arg(&self, args: &[Expression]) -> Option<String> {
        args.first().and_then(|arg| self.eval(arg).string_repr())
    }

    fn string_test(
        &self,
        input: &Value,
        args: &[Expression],
        test: impl Fn(&str, &str) -> bool,
    ) -> Value {
        match (input.singleton(), self.string_arg(args)) {
            (Some(Value::String(s)), Some(arg)) => Value::Boolean(test(s, &arg)),
            _ => Value::Empty,
        }
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    let (left, right) = (left.normalized(), right.normalized());
    match (&left, &right) {
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            left.as_decimal() == right.as_decimal()
        }
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Value {
    let (Some(l), Some(r)) = (left.as_decimal(), right.as_decimal()) else {
        return Value::Empty;
    };
    let result = match op {
        BinaryOp::GreaterThan => l > r,
        BinaryOp::LessThan => l < r,
        BinaryOp::GreaterThanOrEqual => l >= r,
        BinaryOp::LessThanOrEqual => l <= r,
        _ => return Value::Empty,
    };
    Value::Boolean(result)
}

/// Numeric addition when both operands are numbers (or integer strings),
/// string concatenation otherwise.
fn add(left: &Value, right: &Value) -> Value {
    let (Some(l), Some(r)) = (left.singleton(), right.singleton()) else {
        return Value::Empty;
    };

    match (l, r) {
        (Value::Integer(a), Value::Integer(b)) => match a.checked_add(*b) {
            Some(sum) => Value::Integer(sum),
            None => add_decimal(Decimal::from(*a), Decimal::from(*b)),
        },
        (Value::Integer(_) | Value::Decimal(_), Value::Integer(_) | Value::Decimal(_)) => {
            match (l.as_decimal(), r.as_decimal()) {
                (Some(a), Some(b)) => add_decimal(a, b),
                _ => Value::Empty,
            }
        }
        _ => {
            let (Some(a), Some(b)) = (l.string_repr(), r.string_repr()) else {
                return Value::Empty;
            };
            match (a.trim().parse::<i64>(), b.trim().parse::<i64>()) {
                (Ok(x), Ok(y)) => x
                    .checked_add(y)
                    .map(Value::Integer)
                    .unwrap_or(Value::Empty),
                _ => Value::String(a + &b),
            }
        }
    }
}

fn add_decimal(a: Decimal, b: Decimal) -> Value {
    a.checked_add(b).map(Value::Decimal).unwrap_or(Value::Empty)
}

/// The type name given to `is()`/`as()`, written as a bare identifier.
fn type_arg(args: &[Expression]) -> Option<&str> {
    match args.first()? {
        Expression::Identifier(name) | Expression::Member(_, name) => Some(name.as_str()),
        Expression::Literal(Value::String(name)) => Some(name.as_str()),
        _ => None,
    }
}

fn is_of_type(value: &Value, type_name: &str) -> bool {
    match type_name.to_ascii_lowercase().as_str() {
        "string" | "code" | "id" | "uri" | "url" | "canonical" | "markdown" | "oid" | "uuid" => {
            matches!(value, Value::String(_))
        }
        "integer" | "positiveint" | "unsignedint" => matches!(value, Value::Integer(_)),
        "decimal" => matches!(value, Value::Decimal(_)),
        "boolean" => matches!(value, Value::Boolean(_)),
        "date" | "datetime" | "instant" | "time" => match value {
            Value::DateTime(_) => true,
            Value::String(s) => is_date_time_literal(s),
            _ => false,
        },
        _ => matches!(value, Value::Object(_)),
    }
}
