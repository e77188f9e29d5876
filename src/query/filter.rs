//! Declarative record filters.
//!
//! A filter is a JSON object. Every key is ANDed; the key `"or"` takes a list of
//! nested filters of which at least one must match. Any other key is a field
//! path (dot separated for nested objects) mapped either to a literal, meaning
//! equality, or to an object of `{operator: operand}` pairs that must all hold.
//!
//! ```json
//! {"or": [{"name": {"icontains": "star"}}, {"name": "UCSD"}],
//!  "cores_available": {"gte": 32}}
//! ```

use regex_lite::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

use crate::models::Record;

pub const OPERATORS: &[&str] = &[
    "eq", "ne", "lt", "lte", "gt", "gte", "in", "contains", "icontains", "regex", "any", "all",
];

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown filter operator: {op} (valid: {})", OPERATORS.join(", "))]
    UnknownOperator { op: String },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid regex pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl FilterError {
    pub fn kind(&self) -> &'static str {
        match self {
            FilterError::UnknownOperator { .. } => "UnknownOperator",
            FilterError::InvalidFilter(_) => "InvalidFilter",
            FilterError::InvalidPattern { .. } => "InvalidPattern",
        }
    }
}

/// A parsed filter expression
#[derive(Debug, Clone)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Or(Vec<Filter>),
    Field { path: Vec<String>, ops: Vec<Op> },
}

#[derive(Debug, Clone)]
enum Op {
    Eq(Value),
    Ne(Value),
    Cmp(Value, fn(Ordering) -> bool),
    In(Value),
    Contains(String),
    IContains(String),
    Regex(Regex),
    Any(Vec<Op>),
    All(Vec<Op>),
}

impl Filter {
    /// Parse a filter expression. `null` and `{}` give a filter that matches everything.
    pub fn parse(expr: &Value) -> Result<Self, FilterError> {
        match expr {
            Value::Null => Ok(Filter { clauses: Vec::new() }),
            Value::Object(map) => Self::parse_object(map),
            other => Err(FilterError::InvalidFilter(format!(
                "expected an object, got {}",
                type_name(other)
            ))),
        }
    }

    fn parse_object(map: &Map<String, Value>) -> Result<Self, FilterError> {
        let mut clauses = Vec::with_capacity(map.len());
        for (key, spec) in map {
            if key == "or" {
                let subs = spec.as_array().ok_or_else(|| {
                    FilterError::InvalidFilter(format!(
                        "\"or\" expects a list of filters, got {}",
                        type_name(spec)
                    ))
                })?;
                if subs.is_empty() {
                    continue;
                }
                let subs = subs
                    .iter()
                    .map(|sub| match sub {
                        Value::Object(m) => Self::parse_object(m),
                        other => Err(FilterError::InvalidFilter(format!(
                            "\"or\" entries must be objects, got {}",
                            type_name(other)
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                clauses.push(Clause::Or(subs));
                continue;
            }

            clauses.push(Clause::Field {
                path: key.split('.').map(String::from).collect(),
                ops: parse_ops(spec)?,
            });
        }
        Ok(Filter { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Or(subs) => subs.iter().any(|f| f.matches(record)),
            Clause::Field { path, ops } => {
                let value = resolve_field(record, path);
                ops.iter().all(|op| op.matches(value))
            }
        })
    }
}

/// A literal is shorthand for `eq`; an object lists operators
fn parse_ops(spec: &Value) -> Result<Vec<Op>, FilterError> {
    let map = match spec {
        Value::Object(map) => map,
        literal => return Ok(vec![Op::Eq(literal.clone())]),
    };
    map.iter().map(|(op, operand)| parse_op(op, operand)).collect()
}

fn parse_op(op: &str, operand: &Value) -> Result<Op, FilterError> {
    let op = match op {
        "eq" => Op::Eq(operand.clone()),
        "ne" => Op::Ne(operand.clone()),
        "lt" => Op::Cmp(operand.clone(), Ordering::is_lt),
        "lte" => Op::Cmp(operand.clone(), Ordering::is_le),
        "gt" => Op::Cmp(operand.clone(), Ordering::is_gt),
        "gte" => Op::Cmp(operand.clone(), Ordering::is_ge),
        "in" => match operand {
            Value::Array(_) | Value::String(_) | Value::Object(_) => Op::In(operand.clone()),
            other => {
                return Err(FilterError::InvalidFilter(format!(
                    "\"in\" expects a list, got {}",
                    type_name(other)
                )))
            }
        },
        "contains" => Op::Contains(string_operand(op, operand)?.to_string()),
        "icontains" => Op::IContains(string_operand(op, operand)?.to_lowercase()),
        "regex" => {
            let pattern = string_operand(op, operand)?;
            let re = Regex::new(pattern).map_err(|e| FilterError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            Op::Regex(re)
        }
        "any" => Op::Any(parse_ops(operand)?),
        "all" => Op::All(parse_ops(operand)?),
        other => {
            return Err(FilterError::UnknownOperator {
                op: other.to_string(),
            })
        }
    };
    Ok(op)
}

fn string_operand<'a>(op: &str, operand: &'a Value) -> Result<&'a str, FilterError> {
    operand.as_str().ok_or_else(|| {
        FilterError::InvalidFilter(format!(
            "\"{}\" expects a string operand, got {}",
            op,
            type_name(operand)
        ))
    })
}

impl Op {
    fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Op::Eq(operand) => values_equal(value, operand),
            Op::Ne(operand) => !values_equal(value, operand),
            Op::Cmp(operand, accept) => match value {
                Some(v) => compare(v, operand).map(accept).unwrap_or(false),
                None => false,
            },
            Op::In(collection) => match collection {
                Value::Array(items) => items.iter().any(|item| values_equal(value, item)),
                Value::String(s) => value.and_then(Value::as_str).is_some_and(|v| s.contains(v)),
                Value::Object(keys) => value
                    .and_then(Value::as_str)
                    .is_some_and(|v| keys.contains_key(v)),
                _ => false,
            },
            Op::Contains(needle) => contains(value, |hay| hay.contains(needle.as_str())),
            Op::IContains(needle) => {
                contains(value, |hay| hay.to_lowercase().contains(needle.as_str()))
            }
            Op::Regex(re) => value.and_then(Value::as_str).is_some_and(|s| re.is_match(s)),
            Op::Any(ops) => match value {
                Some(Value::Array(items)) => items
                    .iter()
                    .any(|item| ops.iter().all(|op| op.matches(present(item)))),
                _ => false,
            },
            Op::All(ops) => match value {
                Some(Value::Array(items)) => items
                    .iter()
                    .all(|item| ops.iter().all(|op| op.matches(present(item)))),
                _ => false,
            },
        }
    }
}

/// Substring test on strings, key test on objects, element test on arrays
fn contains(value: Option<&Value>, test: impl Fn(&str) -> bool) -> bool {
    match value {
        Some(Value::String(s)) => test(s),
        Some(Value::Object(map)) => map.keys().any(|k| test(k)),
        Some(Value::Array(items)) => items.iter().any(|item| test(&display_value(item))),
        _ => false,
    }
}

/// Walk a dotted path through nested objects; JSON null counts as absent
pub fn resolve_field<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = record.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    present(current)
}

fn present(value: &Value) -> Option<&Value> {
    match value {
        Value::Null => None,
        v => Some(v),
    }
}

/// Equality that treats 64 and 64.0 as the same number
fn values_equal(value: Option<&Value>, operand: &Value) -> bool {
    match (value, operand) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(a), b) => json_eq(a, b),
    }
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Ordering between like-typed scalars; mixed types do not compare
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        v.as_object().unwrap().clone()
    }

    fn check(filter: Value, record: Value) -> bool {
        Filter::parse(&filter).unwrap().matches(&rec(record))
    }

    #[test]
    fn test_gte_scenario() {
        let filter = Filter::parse(&json!({"cores_available": {"gte": 32}})).unwrap();
        let records = [
            rec(json!({"cores_available": 16})),
            rec(json!({"cores_available": 64})),
        ];
        let kept: Vec<_> = records.iter().filter(|r| filter.matches(r)).collect();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0]["cores_available"], 64);
    }

    #[test]
    fn test_shorthand_equals_eq() {
        let record = json!({"name": "STAR", "cores": 64});
        assert!(check(json!({"name": "STAR"}), record.clone()));
        assert!(check(json!({"name": {"eq": "STAR"}}), record.clone()));
        assert!(!check(json!({"name": "UCSD"}), record.clone()));
        assert!(check(json!({"cores": 64.0}), record));
    }

    #[test]
    fn test_or_is_disjunction() {
        let a = json!({"name": "STAR"});
        let b = json!({"cores": {"gt": 100}});
        let record = json!({"name": "UCSD", "cores": 128});
        assert!(check(json!({"or": [a.clone(), b.clone()]}), record.clone()));
        assert!(!check(json!({"or": [a]}), record.clone()));
        assert!(check(json!({"or": []}), record));
    }

    #[test]
    fn test_or_must_be_list() {
        let err = Filter::parse(&json!({"or": {"name": "STAR"}})).unwrap_err();
        assert_eq!(err.kind(), "InvalidFilter");
    }

    #[test]
    fn test_ordering_false_when_absent() {
        assert!(!check(json!({"cores": {"lt": 10}}), json!({"name": "x"})));
        assert!(!check(json!({"cores": {"gte": 0}}), json!({"cores": null})));
        assert!(check(json!({"cores": {"ne": 3}}), json!({"name": "x"})));
        assert!(check(json!({"cores": null}), json!({"name": "x"})));
    }

    #[test]
    fn test_nested_path() {
        let record = json!({"location": {"postal": {"country": "US"}}, "flat": 1});
        assert!(check(json!({"location.postal.country": "US"}), record.clone()));
        assert!(!check(json!({"flat.deeper": {"eq": 1}}), record.clone()));
        assert!(!check(json!({"location.missing.country": "US"}), record));
    }

    #[test]
    fn test_contains_polymorphism() {
        let host = json!({
            "name": "star-w1",
            "components": {"FPGA-Xilinx-U280": 1, "GPU-Tesla T4": 2},
            "tags": ["edge", 42]
        });
        assert!(check(json!({"name": {"contains": "w1"}}), host.clone()));
        assert!(check(json!({"components": {"contains": "FPGA"}}), host.clone()));
        assert!(check(json!({"components": {"icontains": "tesla"}}), host.clone()));
        assert!(check(json!({"tags": {"contains": "42"}}), host.clone()));
        assert!(!check(json!({"tags": {"contains": "core"}}), host.clone()));
        assert!(check(json!({"name": {"icontains": "STAR"}}), host));
    }

    #[test]
    fn test_in_and_regex() {
        let record = json!({"name": "TACC", "state": "Active"});
        assert!(check(json!({"name": {"in": ["STAR", "TACC"]}}), record.clone()));
        assert!(!check(json!({"name": {"in": ["STAR"]}}), record.clone()));
        assert!(check(json!({"name": {"regex": "^TA"}}), record.clone()));
        assert!(check(json!({"state": {"regex": "tiv"}}), record));
    }

    #[test]
    fn test_any_all() {
        let record = json!({"ports": [10, 25, 100], "empty": []});
        assert!(check(json!({"ports": {"any": {"gte": 100}}}), record.clone()));
        assert!(!check(json!({"ports": {"all": {"gte": 25}}}), record.clone()));
        assert!(check(json!({"ports": {"all": {"gt": 0}}}), record.clone()));
        assert!(check(json!({"ports": {"any": 25}}), record.clone()));
        assert!(!check(json!({"empty": {"any": 1}}), record.clone()));
        assert!(check(json!({"empty": {"all": 1}}), record));
    }

    #[test]
    fn test_multiple_operators_are_anded() {
        let filter = json!({"cores": {"gte": 10, "lt": 20}});
        assert!(check(filter.clone(), json!({"cores": 15})));
        assert!(!check(filter, json!({"cores": 25})));
    }

    #[test]
    fn test_parse_errors() {
        let err = Filter::parse(&json!({"name": {"startswith": "S"}})).unwrap_err();
        assert_eq!(err.kind(), "UnknownOperator");
        assert!(err.to_string().contains("startswith"));

        let err = Filter::parse(&json!({"name": {"regex": "("}})).unwrap_err();
        assert_eq!(err.kind(), "InvalidPattern");

        let err = Filter::parse(&json!(["name"])).unwrap_err();
        assert_eq!(err.kind(), "InvalidFilter");

        assert!(Filter::parse(&Value::Null).unwrap().is_empty());
    }
}
