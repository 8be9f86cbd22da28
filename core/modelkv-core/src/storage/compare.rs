//! Value comparison shared by backends, conditions and in-memory sorting.
//!
//! Numbers and numeric strings compare numerically (`time` is often stored
//! as a string) and sort ahead of all other strings; values of different
//! kinds fall back to a fixed type rank.

use serde_json::Value;
use std::cmp::Ordering;

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Sort class. Numbers and numeric strings share one class, ahead of
/// every other string, so the order stays total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Class {
    Null,
    Bool,
    Numeric,
    Text,
    Array,
    Object,
}

fn class(value: &Value) -> Class {
    match value {
        Value::Null => Class::Null,
        Value::Bool(_) => Class::Bool,
        Value::Number(_) => Class::Numeric,
        Value::String(_) if as_number(value).is_some() => Class::Numeric,
        Value::String(_) => Class::Text,
        Value::Array(_) => Class::Array,
        Value::Object(_) => Class::Object,
    }
}

/// Equality used by filters: exact JSON equality, or numeric equality when
/// at least one side is a number.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    if !(a.is_number() || b.is_number()) {
        return false;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Total order over JSON values: class first, then within the class.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ca, cb) = (class(a), class(b));
    if ca != cb {
        return ca.cmp(&cb);
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::String(x), Value::String(y)) if ca == Class::Text => x.cmp(y),
        _ if ca == Class::Numeric => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => Ordering::Equal,
        },
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Missing values sort first.
pub fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_values(x, y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
