//! Filter documents: `{ "EQ": { "author": "bob" }, "BETWEEN": { "time": [1, 5] } }`.
//!
//! Parsing is lenient. Unknown operators, operands of the wrong shape and
//! nested operator objects are logged and dropped.

use crate::error::{MkvError, MkvResult};
use crate::storage::{Condition, ConditionOp};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const OP_EQ: &str = "EQ";
pub const OP_STARTS_WITH: &str = "STARTS_WITH";
pub const OP_IN: &str = "IN";
pub const OP_BETWEEN: &str = "BETWEEN";

/// Operator names recognised at the top level of a filter.
pub const OPERATORS: [&str; 4] = [OP_EQ, OP_STARTS_WITH, OP_IN, OP_BETWEEN];

/// Flat conjunction of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::eq(property, value));
        self
    }

    pub fn starts_with(mut self, property: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.conditions.push(Condition::starts_with(property, prefix));
        self
    }

    pub fn is_in(mut self, property: impl Into<String>, values: Vec<Value>) -> Self {
        self.conditions.push(Condition::is_in(property, values));
        self
    }

    pub fn between(
        mut self,
        property: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        self.conditions.push(Condition::between(property, low, high));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Properties constrained by `EQ`, in filter order.
    pub fn eq_properties(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .filter(|c| c.is_eq())
            .map(|c| c.attribute.as_str())
    }

    /// Parse a filter document. Only a non-object document is an error.
    pub fn from_json(value: &Value) -> MkvResult<Self> {
        let ops = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(ops) => ops,
            other => {
                return Err(MkvError::InvalidFilter(format!(
                    "expected an object of operators, got {other}"
                )));
            }
        };

        let mut filter = Self::default();
        for (op, operands) in ops {
            let Some(operands) = operands.as_object() else {
                debug!(op = %op, "operator operand is not an object, ignored");
                continue;
            };

            for (property, operand) in operands {
                if OPERATORS.contains(&property.as_str()) {
                    debug!(op = %op, nested = %property, "nested operators not supported, ignored");
                    continue;
                }
                match parse_op(op, operand) {
                    Some(parsed) => filter.conditions.push(Condition::new(property.clone(), parsed)),
                    None => debug!(op = %op, property = %property, "unsupported operator, ignored"),
                }
            }
        }
        Ok(filter)
    }
}

fn parse_op(op: &str, operand: &Value) -> Option<ConditionOp> {
    match op {
        OP_EQ => Some(ConditionOp::Eq(operand.clone())),
        OP_STARTS_WITH => operand
            .as_str()
            .map(|prefix| ConditionOp::StartsWith(prefix.to_string())),
        OP_IN => operand.as_array().map(|values| ConditionOp::In(values.clone())),
        OP_BETWEEN => match operand.as_array().map(Vec::as_slice) {
            Some([low, high]) => Some(ConditionOp::Between(low.clone(), high.clone())),
            _ => None,
        },
        _ => None,
    }
}

/// Sort instruction; `desc` is accepted as an alias of `descending`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderBy {
    pub property: String,
    #[serde(default, alias = "desc")]
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            descending: false,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            descending: true,
        }
    }
}
