//! Decoding SQLite rows into typed record values.

use crate::catalog::{Collection, FieldDef, FieldKind};
use crate::record::{Record, Value};
use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Build a record from a row selected with `"<table>".*`.
///
/// Columns that are not part of the schema are ignored; schema fields
/// missing from the row keep their zero value.
pub(crate) fn decode_record(collection: &Arc<Collection>, row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Record::new(collection.clone());
    for field in &collection.fields {
        let raw = match row.get_ref(field.name.as_str()) {
            Ok(raw) => raw,
            Err(rusqlite::Error::InvalidColumnName(_)) => continue,
            Err(err) => return Err(err),
        };
        record.set(field.name.clone(), decode_value(field, raw));
    }
    Ok(record)
}

/// Convert a raw column value according to the field's declared kind.
pub(crate) fn decode_value(field: &FieldDef, raw: ValueRef<'_>) -> Value {
    match &field.kind {
        FieldKind::Number => Value::Float(match raw {
            ValueRef::Integer(n) => n as f64,
            ValueRef::Real(n) => n,
            ValueRef::Text(t) => std::str::from_utf8(t)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or_default(),
            _ => 0.0,
        }),
        FieldKind::Bool => Value::Bool(match raw {
            ValueRef::Integer(n) => n != 0,
            ValueRef::Real(n) => n != 0.0,
            ValueRef::Text(t) => matches!(t, b"1" | b"true" | b"TRUE"),
            _ => false,
        }),
        FieldKind::Json => match text(raw) {
            Some(s) if !s.is_empty() => serde_json::from_str(&s)
                .map(Value::Json)
                .unwrap_or(Value::Json(JsonValue::String(s))),
            _ => Value::Null,
        },
        _ if field.is_multiple() => {
            let items = text(raw)
                .and_then(|s| serde_json::from_str::<Vec<JsonValue>>(&s).ok())
                .unwrap_or_default()
                .into_iter()
                .filter_map(|item| match item {
                    JsonValue::String(s) => Some(s),
                    JsonValue::Null => None,
                    other => Some(other.to_string()),
                })
                .collect();
            Value::List(items)
        }
        _ => Value::Text(text(raw).unwrap_or_default()),
    }
}

fn text(raw: ValueRef<'_>) -> Option<String> {
    match raw {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(n.to_string()),
        ValueRef::Real(n) => Some(n.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}
