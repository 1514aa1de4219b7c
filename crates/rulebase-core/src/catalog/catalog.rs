//! Collection registry.

use super::collection::Collection;
use super::field::FieldKind;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Validated, immutable set of collections.
///
/// Collections are shared by reference with every record and resolver
/// created from them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    collections: Vec<Arc<Collection>>,
}

impl Catalog {
    /// Build a catalog, validating names, fields and relation targets.
    pub fn new(collections: Vec<Collection>) -> Result<Self> {
        let mut names = HashSet::new();
        let mut ids = HashSet::new();

        for collection in &collections {
            validate_identifier(&collection.name)
                .map_err(|e| Error::Schema(format!("collection name {}", e)))?;
            if collection.id.is_empty() {
                return Err(Error::Schema(format!(
                    "collection '{}' has an empty id",
                    collection.name
                )));
            }
            if !names.insert(collection.name.to_lowercase()) {
                return Err(Error::Schema(format!(
                    "duplicate collection name '{}'",
                    collection.name
                )));
            }
            if !ids.insert(collection.id.as_str()) {
                return Err(Error::Schema(format!(
                    "duplicate collection id '{}'",
                    collection.id
                )));
            }
        }

        for collection in &collections {
            validate_fields(collection, &ids)?;
            if !collection.is_auth() && collection.manage_rule.as_deref().is_some() {
                return Err(Error::Schema(format!(
                    "manage rule is only supported on auth collections ('{}')",
                    collection.name
                )));
            }
        }

        Ok(Self {
            collections: collections.into_iter().map(Arc::new).collect(),
        })
    }

    /// Load and validate a JSON array of collections.
    pub fn from_json(json: &str) -> Result<Self> {
        let collections: Vec<Collection> = serde_json::from_str(json)?;
        Self::new(collections)
    }

    /// Find a collection by id or (case-insensitive) name.
    pub fn find(&self, name_or_id: &str) -> Option<Arc<Collection>> {
        self.find_by_id(name_or_id).or_else(|| {
            self.collections
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name_or_id))
                .cloned()
        })
    }

    pub fn find_by_id(&self, id: &str) -> Option<Arc<Collection>> {
        self.collections.iter().find(|c| c.id == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Collection>> {
        self.collections.iter()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

fn validate_fields(collection: &Collection, collection_ids: &HashSet<&str>) -> Result<()> {
    let mut seen = HashSet::new();

    match collection.fields.first() {
        Some(field) if field.name == "id" => {}
        _ => {
            return Err(Error::Schema(format!(
                "collection '{}' must start with the 'id' field",
                collection.name
            )))
        }
    }

    for field in &collection.fields {
        validate_identifier(&field.name).map_err(|e| {
            Error::Schema(format!("field name {} in '{}'", e, collection.name))
        })?;
        if !seen.insert(field.name.to_lowercase()) {
            return Err(Error::Schema(format!(
                "duplicate field '{}' in '{}'",
                field.name, collection.name
            )));
        }

        match &field.kind {
            FieldKind::Relation {
                collection_id,
                max_select,
            } => {
                if !collection_ids.contains(collection_id.as_str()) {
                    return Err(Error::Schema(format!(
                        "relation '{}.{}' targets unknown collection '{}'",
                        collection.name, field.name, collection_id
                    )));
                }
                if *max_select == 0 {
                    return Err(Error::Schema(format!(
                        "relation '{}.{}' must allow at least one value",
                        collection.name, field.name
                    )));
                }
            }
            FieldKind::Select { values, max_select } => {
                if values.is_empty() || *max_select == 0 {
                    return Err(Error::Schema(format!(
                        "select '{}.{}' needs at least one option",
                        collection.name, field.name
                    )));
                }
            }
            _ => {}
        }
    }

    Ok(())
}

/// Names become SQL identifiers and aliases, so only a conservative
/// character set is accepted. The `__` prefix is reserved for internal aliases.
pub fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 100;

    if !valid {
        return Err(format!("'{}' is not a valid identifier", name));
    }
    if name.starts_with("__") {
        return Err(format!("'{}' uses the reserved '__' prefix", name));
    }
    Ok(())
}
