//! Typed record field values.

use crate::catalog::{FieldDef, FieldKind};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde_json::Value as JsonValue;

/// A record field value.
///
/// The variant is determined by the field's declared kind, so a record's data
/// is always consistent with its collection schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Multi-valued select, relation and file fields.
    List(Vec<String>),
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value counts as "not set" for required checks.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Float(n) => *n == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Json(json) => json.is_null(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Values as a list of strings; scalars become a one item list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Value::List(items) => items.clone(),
            Value::Text(s) if s.is_empty() => Vec::new(),
            Value::Text(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(n) => JsonValue::from(*n),
            Value::Float(n) => float_to_json(*n),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::List(items) => {
                JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
            }
            Value::Json(json) => json.clone(),
        }
    }

    /// Coerce a submitted JSON value into the representation of `field`.
    ///
    /// Coercion is lenient (numbers from numeric strings, lists from single
    /// values); validation happens separately.
    pub fn coerce(field: &FieldDef, raw: &JsonValue) -> Value {
        match &field.kind {
            FieldKind::Number => Value::Float(match raw {
                JsonValue::Number(n) => n.as_f64().unwrap_or_default(),
                JsonValue::String(s) => s.trim().parse().unwrap_or_default(),
                JsonValue::Bool(b) => f64::from(u8::from(*b)),
                _ => 0.0,
            }),
            FieldKind::Bool => Value::Bool(match raw {
                JsonValue::Bool(b) => *b,
                JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
                JsonValue::String(s) => matches!(s.trim(), "true" | "1"),
                _ => false,
            }),
            FieldKind::Json => match raw {
                JsonValue::Null => Value::Null,
                other => Value::Json(other.clone()),
            },
            _ if field.is_multiple() => {
                let mut items: Vec<String> = match raw {
                    JsonValue::Array(items) => items.iter().filter_map(scalar_to_string).collect(),
                    other => scalar_to_string(other).into_iter().collect(),
                };
                items.retain(|s| !s.is_empty());
                dedup_preserving_order(&mut items);
                Value::List(items)
            }
            FieldKind::Select { .. } | FieldKind::Relation { .. } | FieldKind::File { .. } => {
                // single value fields keep the last submitted item
                let value = match raw {
                    JsonValue::Array(items) => {
                        items.iter().rev().find_map(scalar_to_string).unwrap_or_default()
                    }
                    other => scalar_to_string(other).unwrap_or_default(),
                };
                Value::Text(value)
            }
            _ => Value::Text(scalar_to_string(raw).unwrap_or_default()),
        }
    }
}

fn float_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        JsonValue::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

fn scalar_to_string(raw: &JsonValue) -> Option<String> {
    match raw {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(n) => ToSqlOutput::Owned(SqlValue::Integer(*n)),
            Value::Float(n) => ToSqlOutput::Owned(SqlValue::Real(*n)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::List(items) => ToSqlOutput::Owned(SqlValue::Text(
                serde_json::to_string(items)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
            )),
            Value::Json(JsonValue::Null) => ToSqlOutput::Owned(SqlValue::Null),
            Value::Json(json) => ToSqlOutput::Owned(SqlValue::Text(json.to_string())),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items)
    }
}
