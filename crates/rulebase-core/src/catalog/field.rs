//! Field definitions for collections.

use crate::record::Value;
use serde::{Deserialize, Serialize};

/// A field definition within a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name (also the column name).
    pub name: String,
    /// Field data type and type specific options.
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Hidden fields are never returned to, nor filterable by, non-superusers.
    #[serde(default)]
    pub hidden: bool,
    /// Whether an empty value is rejected on write.
    #[serde(default)]
    pub required: bool,
    /// System fields are created by the engine and cannot be removed.
    #[serde(default)]
    pub system: bool,
}

/// Field data types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Plain text.
    Text,
    /// Email address.
    Email,
    /// URL.
    Url,
    /// Numeric value stored as a double.
    Number,
    /// Boolean stored as 0/1.
    Bool,
    /// Datetime string (`YYYY-MM-DD HH:MM:SS.mmmZ`).
    Date,
    /// Datetime maintained by the engine.
    Autodate {
        #[serde(default, rename = "onCreate")]
        on_create: bool,
        #[serde(default, rename = "onUpdate")]
        on_update: bool,
    },
    /// Arbitrary JSON.
    Json,
    /// Password hash. Never resolvable as a filter value.
    Password,
    /// One or more values from a fixed list.
    Select {
        values: Vec<String>,
        #[serde(default = "default_max_select", rename = "maxSelect")]
        max_select: usize,
    },
    /// Reference(s) to records of another collection.
    Relation {
        #[serde(rename = "collectionId")]
        collection_id: String,
        #[serde(default = "default_max_select", rename = "maxSelect")]
        max_select: usize,
    },
    /// Uploaded file name(s).
    File {
        #[serde(default = "default_max_select", rename = "maxSelect")]
        max_select: usize,
        /// Protected files require a file token to download.
        #[serde(default)]
        protected: bool,
    },
}

fn default_max_select() -> usize {
    1
}

impl FieldKind {
    /// Name of the type as used in schema JSON.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Url => "url",
            FieldKind::Number => "number",
            FieldKind::Bool => "bool",
            FieldKind::Date => "date",
            FieldKind::Autodate { .. } => "autodate",
            FieldKind::Json => "json",
            FieldKind::Password => "password",
            FieldKind::Select { .. } => "select",
            FieldKind::Relation { .. } => "relation",
            FieldKind::File { .. } => "file",
        }
    }
}

impl FieldDef {
    /// Create a new optional, visible field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            hidden: false,
            required: false,
            system: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn select(name: impl Into<String>, values: &[&str], max_select: usize) -> Self {
        Self::new(
            name,
            FieldKind::Select {
                values: values.iter().map(|v| v.to_string()).collect(),
                max_select,
            },
        )
    }

    pub fn relation(
        name: impl Into<String>,
        collection_id: impl Into<String>,
        max_select: usize,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Relation {
                collection_id: collection_id.into(),
                max_select,
            },
        )
    }

    /// Mark the field as hidden.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the field as a system field.
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    /// Whether the field holds a list of values.
    pub fn is_multiple(&self) -> bool {
        match &self.kind {
            FieldKind::Select { max_select, .. }
            | FieldKind::Relation { max_select, .. }
            | FieldKind::File { max_select, .. } => *max_select > 1,
            _ => false,
        }
    }

    /// Target collection id for relation fields.
    pub fn relation_target(&self) -> Option<&str> {
        match &self.kind {
            FieldKind::Relation { collection_id, .. } => Some(collection_id),
            _ => None,
        }
    }

    /// Whether the value is stored as text (and can be lower-cased or pattern matched).
    pub fn is_textual(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Text
                | FieldKind::Email
                | FieldKind::Url
                | FieldKind::Date
                | FieldKind::Autodate { .. }
        ) || (matches!(
            self.kind,
            FieldKind::Select { .. } | FieldKind::Relation { .. } | FieldKind::File { .. }
        ) && !self.is_multiple())
    }

    /// SQLite column definition used when creating the collection table.
    pub fn column_definition(&self) -> String {
        let column = crate::query::quote_ident(&self.name);
        if self.name == "id" {
            return format!("{} TEXT PRIMARY KEY NOT NULL", column);
        }
        let ty = match &self.kind {
            FieldKind::Number => "NUMERIC DEFAULT 0 NOT NULL",
            FieldKind::Bool => "BOOLEAN DEFAULT FALSE NOT NULL",
            FieldKind::Json => "JSON DEFAULT NULL",
            _ if self.is_multiple() => "JSON DEFAULT '[]' NOT NULL",
            _ => "TEXT DEFAULT '' NOT NULL",
        };
        format!("{} {}", column, ty)
    }

    /// The value a freshly created record holds for this field.
    pub fn zero_value(&self) -> Value {
        match &self.kind {
            FieldKind::Number => Value::Float(0.0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Json => Value::Null,
            _ if self.is_multiple() => Value::List(Vec::new()),
            _ => Value::Text(String::new()),
        }
    }
}
