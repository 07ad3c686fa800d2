//! # Row Filter Expressions
//!
//! Filters in the backend's `column=op.value` syntax, used both for
//! row-filtered queries and for change-feed registrations.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{BackendError, BackendResult};

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Pattern match (`%` any run, `_` one char)
    Like,
    /// Value in list
    In,
    /// Is null / is not null
    Is,
}

impl FilterOperator {
    /// Get the operator string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::In => "in",
            FilterOperator::Is => "is",
        }
    }

    fn parse(op: &str) -> Option<Self> {
        let op = match op {
            "eq" => FilterOperator::Eq,
            "neq" => FilterOperator::Neq,
            "gt" => FilterOperator::Gt,
            "gte" => FilterOperator::Gte,
            "lt" => FilterOperator::Lt,
            "lte" => FilterOperator::Lte,
            "like" => FilterOperator::Like,
            "in" => FilterOperator::In,
            "is" => FilterOperator::Is,
            _ => return None,
        };
        Some(op)
    }
}

/// A single-column filter expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Column to filter on
    pub field: String,

    /// Comparison operator
    #[serde(rename = "op")]
    pub operator: FilterOperator,

    /// Value to compare against
    pub value: Value,
}

impl FilterExpr {
    /// Create a new filter expression
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, FilterOperator::Eq, value.into())
    }

    /// Create an "in list" filter
    pub fn in_list(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(field, FilterOperator::In, Value::Array(values))
    }

    /// Parse `column=op.value`, e.g. `recipient_id=eq.42` or
    /// `status=in.(open,late)`.
    pub fn parse(expr: &str) -> BackendResult<Self> {
        let expr = expr.trim();
        let (field, rest) = expr
            .split_once('=')
            .ok_or_else(|| BackendError::InvalidFilter(format!("missing '=' in '{}'", expr)))?;

        let field = field.trim();
        if field.is_empty() {
            return Err(BackendError::InvalidFilter(format!(
                "missing column in '{}'",
                expr
            )));
        }

        let (op, value) = rest.split_once('.').ok_or_else(|| {
            BackendError::InvalidFilter(format!("missing operator in '{}'", expr))
        })?;

        let operator = FilterOperator::parse(op)
            .ok_or_else(|| BackendError::InvalidFilter(format!("unknown operator '{}'", op)))?;

        let value = parse_filter_value(value);
        if operator == FilterOperator::In && !value.is_array() {
            return Err(BackendError::InvalidFilter(format!(
                "'in' expects a list like (a,b), got '{}'",
                rest
            )));
        }

        Ok(Self::new(field, operator, value))
    }

    /// Check if a row matches this filter
    pub fn matches(&self, row: &Value) -> bool {
        let field_value = match row.get(&self.field) {
            Some(v) => v,
            None => return self.operator == FilterOperator::Is && self.value.is_null(),
        };

        match self.operator {
            FilterOperator::Eq => loose_eq(field_value, &self.value),
            FilterOperator::Neq => !loose_eq(field_value, &self.value),
            FilterOperator::Gt => compare_json_values(field_value, &self.value) > 0,
            FilterOperator::Gte => compare_json_values(field_value, &self.value) >= 0,
            FilterOperator::Lt => compare_json_values(field_value, &self.value) < 0,
            FilterOperator::Lte => compare_json_values(field_value, &self.value) <= 0,
            FilterOperator::Like => {
                match (field_value.as_str(), self.value.as_str()) {
                    (Some(field_str), Some(pattern)) => matches_like_pattern(field_str, pattern),
                    _ => false,
                }
            }
            FilterOperator::In => match self.value.as_array() {
                Some(arr) => arr.iter().any(|candidate| loose_eq(field_value, candidate)),
                None => false,
            },
            FilterOperator::Is => {
                if self.value.is_null() {
                    field_value.is_null()
                } else {
                    loose_eq(field_value, &self.value)
                }
            }
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}.", self.field, self.operator.as_str())?;
        match &self.value {
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(scalar_text).collect();
                write!(f, "({})", items.join(","))
            }
            other => write!(f, "{}", scalar_text(other)),
        }
    }
}

/// Match a row against every filter (AND)
pub fn matches_all(filters: &[FilterExpr], row: &Value) -> bool {
    filters.iter().all(|f| f.matches(row))
}

/// Parse a filter value (handles lists for the `in` operator)
fn parse_filter_value(value: &str) -> Value {
    if value.starts_with('(') && value.ends_with(')') {
        let inner = &value[1..value.len() - 1];
        let items = inner
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(parse_scalar)
            .collect();
        return Value::Array(items);
    }

    parse_scalar(value)
}

fn parse_scalar(value: &str) -> Value {
    match value {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = value.parse::<f64>() {
        if let Some(num) = serde_json::Number::from_f64(n) {
            return Value::Number(num);
        }
    }

    Value::String(value.to_string())
}

/// Textual form of a scalar, as it appears in filter syntax
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Equality that tolerates the type loss of the textual filter syntax
/// (`school_id=eq.123` must match a row storing `"123"`).
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(_), _) | (Value::Object(_), _) => false,
        (_, Value::Array(_)) | (_, Value::Object(_)) => false,
        _ => scalar_text(a) == scalar_text(b),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Compare two JSON values for ordering
pub(crate) fn compare_json_values(a: &Value, b: &Value) -> i32 {
    if let (Some(a_f), Some(b_f)) = (as_number(a), as_number(b)) {
        return if a_f < b_f {
            -1
        } else if a_f > b_f {
            1
        } else {
            0
        };
    }

    match (a, b) {
        (Value::String(a), Value::String(b)) => a.cmp(b) as i32,
        _ => 0,
    }
}

/// LIKE pattern matching (`%` = any sequence, `_` = single char)
fn matches_like_pattern(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_match(&value, &pattern)
}

fn like_match(value: &[char], pattern: &[char]) -> bool {
    match pattern.first() {
        None => value.is_empty(),
        Some('%') => (0..=value.len()).any(|skip| like_match(&value[skip..], &pattern[1..])),
        Some('_') => !value.is_empty() && like_match(&value[1..], &pattern[1..]),
        Some(c) => value.first() == Some(c) && like_match(&value[1..], &pattern[1..]),
    }
}
