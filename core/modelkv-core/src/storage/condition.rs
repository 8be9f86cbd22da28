//! Attribute conditions evaluated by the physical backend.

use super::compare::{compare_values, loose_eq};
use crate::resource::Resource;
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOp {
    Eq(Value),
    StartsWith(String),
    In(Vec<Value>),
    /// Inclusive on both ends.
    Between(Value, Value),
}

impl ConditionOp {
    pub fn name(&self) -> &'static str {
        match self {
            ConditionOp::Eq(_) => "EQ",
            ConditionOp::StartsWith(_) => "STARTS_WITH",
            ConditionOp::In(_) => "IN",
            ConditionOp::Between(..) => "BETWEEN",
        }
    }
}

/// `attribute <op> operand`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub attribute: String,
    pub op: ConditionOp,
}

impl Condition {
    pub fn new(attribute: impl Into<String>, op: ConditionOp) -> Self {
        Self {
            attribute: attribute.into(),
            op,
        }
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute, ConditionOp::Eq(value.into()))
    }

    pub fn starts_with(attribute: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::new(attribute, ConditionOp::StartsWith(prefix.into()))
    }

    pub fn is_in(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(attribute, ConditionOp::In(values))
    }

    pub fn between(
        attribute: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::new(attribute, ConditionOp::Between(low.into(), high.into()))
    }

    pub fn is_eq(&self) -> bool {
        matches!(self.op, ConditionOp::Eq(_))
    }

    /// Operand of an `EQ` condition.
    pub fn eq_value(&self) -> Option<&Value> {
        match &self.op {
            ConditionOp::Eq(value) => Some(value),
            _ => None,
        }
    }

    /// A missing attribute only matches `EQ null`.
    pub fn matches(&self, row: &Resource) -> bool {
        let Some(value) = row.get(&self.attribute) else {
            return matches!(&self.op, ConditionOp::Eq(Value::Null));
        };

        match &self.op {
            ConditionOp::Eq(expected) => loose_eq(value, expected),
            ConditionOp::StartsWith(prefix) => value
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            ConditionOp::In(candidates) => candidates.iter().any(|c| loose_eq(value, c)),
            ConditionOp::Between(low, high) => {
                compare_values(value, low) != Ordering::Less
                    && compare_values(value, high) != Ordering::Greater
            }
        }
    }
}
