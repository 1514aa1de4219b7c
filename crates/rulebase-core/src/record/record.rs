//! Records: a collection reference plus typed field values.

use super::value::{dedup_preserving_order, Value};
use crate::catalog::{Collection, FieldDef, FieldKind};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

static NULL: Value = Value::Null;

/// A single record of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    collection: Arc<Collection>,
    data: BTreeMap<String, Value>,
}

impl Record {
    /// Create a record holding the zero value of every field.
    pub fn new(collection: Arc<Collection>) -> Self {
        let data = collection
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.zero_value()))
            .collect();
        Self { collection, data }
    }

    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn id(&self) -> &str {
        self.get_str("id")
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.data.insert("id".to_string(), Value::Text(id.into()));
    }

    /// Value of a field, `Null` when unknown.
    pub fn get(&self, name: &str) -> &Value {
        self.data.get(name).unwrap_or(&NULL)
    }

    /// Text value of a field, empty when unset or not textual.
    pub fn get_str(&self, name: &str) -> &str {
        self.get(name).as_str().unwrap_or_default()
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).as_bool().unwrap_or(false)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }

    /// Force the auth `verified` flag to false. No-op on base collections.
    pub fn set_verified(&mut self, verified: bool) {
        if self.collection.is_auth() {
            self.set("verified", verified);
        }
    }

    /// Schema fields paired with their current values, in schema order.
    pub fn fields(&self) -> impl Iterator<Item = (&FieldDef, &Value)> {
        self.collection
            .fields
            .iter()
            .map(|f| (f, self.data.get(&f.name).unwrap_or(&NULL)))
    }

    /// Copy the data onto another collection definition with the same fields.
    pub fn with_collection(&self, collection: Arc<Collection>) -> Record {
        Record {
            collection,
            data: self.data.clone(),
        }
    }

    /// Coerce and assign every submitted key that names a schema field.
    ///
    /// Password fields are skipped; they are hashed by the caller.
    pub fn load(&mut self, data: &Map<String, JsonValue>) {
        for field in &self.collection.fields {
            if matches!(field.kind, FieldKind::Password | FieldKind::Autodate { .. }) {
                continue;
            }
            if let Some(raw) = data.get(&field.name) {
                let value = Value::coerce(field, raw);
                self.data.insert(field.name.clone(), value);
            }
        }
    }

    /// Resolve `field+`, `+field` and `field-` modifier keys against the
    /// record's current values and return the plain field data.
    ///
    /// Multi-valued fields append, prepend or remove items; number fields add
    /// or subtract. Modifier keys for other fields are dropped.
    pub fn replace_modifiers(&self, mut data: Map<String, JsonValue>) -> Map<String, JsonValue> {
        for field in &self.collection.fields {
            let prepend = data.remove(&format!("+{}", field.name));
            let append = data.remove(&format!("{}+", field.name));
            let subtract = data.remove(&format!("{}-", field.name));
            if prepend.is_none() && append.is_none() && subtract.is_none() {
                continue;
            }

            let base = match data.get(&field.name) {
                Some(raw) => Value::coerce(field, raw),
                None => self.get(&field.name).clone(),
            };

            let resolved = if field.is_multiple() {
                let mut items = base.to_list();
                if let Some(raw) = prepend {
                    let mut front = Value::coerce(field, &raw).to_list();
                    front.append(&mut items);
                    items = front;
                }
                if let Some(raw) = append {
                    items.extend(Value::coerce(field, &raw).to_list());
                }
                if let Some(raw) = subtract {
                    let remove = Value::coerce(field, &raw).to_list();
                    items.retain(|item| !remove.contains(item));
                }
                dedup_preserving_order(&mut items);
                Value::List(items).to_json()
            } else if matches!(field.kind, FieldKind::Number) {
                let mut n = base.as_f64().unwrap_or_default();
                if let Some(raw) = append {
                    n += Value::coerce(field, &raw).as_f64().unwrap_or_default();
                }
                if let Some(raw) = subtract {
                    n -= Value::coerce(field, &raw).as_f64().unwrap_or_default();
                }
                Value::Float(n).to_json()
            } else {
                continue;
            };

            data.insert(field.name.clone(), resolved);
        }
        data
    }

    /// Serialize the record for a response.
    ///
    /// Password fields are never exported. Other hidden fields are only
    /// included when `include_hidden` is set.
    pub fn export(&self, include_hidden: bool) -> Map<String, JsonValue> {
        let mut out = Map::new();
        out.insert(
            "collectionId".to_string(),
            JsonValue::String(self.collection.id.clone()),
        );
        out.insert(
            "collectionName".to_string(),
            JsonValue::String(self.collection.name.clone()),
        );
        for (field, value) in self.fields() {
            if matches!(field.kind, FieldKind::Password) || (field.hidden && !include_hidden) {
                continue;
            }
            out.insert(field.name.clone(), value.to_json());
        }
        out
    }
}
