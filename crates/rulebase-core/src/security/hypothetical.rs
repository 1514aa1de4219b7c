//! Rule checks against a record that has not been persisted yet.
//!
//! The submitted record is projected as a single-row CTE named after a
//! throwaway copy of its collection, and the rule is compiled against that
//! copy. Nothing is written to the database.

use crate::catalog::{Catalog, Collection};
use crate::error::Result;
use crate::query::{compile, quote_ident, RecordFieldResolver, SelectQuery};
use crate::record::{random_string, Record};
use crate::security::RequestInfo;
use crate::store::Store;
use std::sync::Arc;

/// Marker embedded in synthetic collection names and parameter names.
pub const DUMMY_MARKER: &str = "__rb_create__";

/// A not-yet-persisted record exposed as a queryable single-row table.
#[derive(Debug, Clone)]
pub struct HypotheticalRecord {
    collection: Arc<Collection>,
    record: Record,
}

impl HypotheticalRecord {
    /// Build the hypothetical row from submitted, already validated data.
    ///
    /// The auth `verified` flag is always false inside the row so rules
    /// cannot be satisfied by self-declared status.
    pub fn new(record: &Record) -> Self {
        let suffix = format!("{}{}", DUMMY_MARKER, random_string(6));

        let mut collection = (**record.collection()).clone();
        collection.id = format!("{}{}", collection.id, suffix);
        collection.name = format!("{}{}", collection.name, suffix);
        let collection = Arc::new(collection);

        let mut dummy = record.with_collection(collection.clone());
        if dummy.id().is_empty() {
            dummy.set_id(format!("__temp_id__{}", suffix));
        }
        dummy.set_verified(false);

        Self {
            collection,
            record: dummy,
        }
    }

    /// The synthetic collection (also the CTE name).
    pub fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// `WITH "<dummy>" AS (SELECT :p AS "col", ...) SELECT (1) FROM "<dummy>"`.
    pub fn query(&self) -> SelectQuery {
        let name = &self.collection.name;
        let mut columns = Vec::new();
        let mut params = Vec::new();

        for (field, value) in self.record.fields() {
            let param = format!("{}{}", DUMMY_MARKER, field.name);
            columns.push(format!(":{} AS {}", param, quote_ident(&field.name)));
            params.push((param, value.clone()));
        }

        let mut query = SelectQuery::new()
            .with_cte(name, format!("SELECT {}", columns.join(", ")))
            .with_select("(1)")
            .with_from(name, name);
        for (param, value) in params {
            query.bind(&param, value);
        }
        query
    }

    /// Whether the rule expression holds for the hypothetical row.
    ///
    /// The same expression compiled against the real table yields the same
    /// decision once the row exists.
    pub fn check(
        &self,
        store: &Store,
        catalog: &Catalog,
        request: &RequestInfo,
        rule: &str,
    ) -> Result<bool> {
        let expr = rulebase_lang::parse(rule)?;
        let mut resolver = RecordFieldResolver::new(catalog, self.collection.clone(), request);
        let predicate = compile(&expr, &mut resolver)?;

        let mut query = self.query();
        query.and_where(predicate).limit(1);
        resolver.update_query(&mut query);

        store.exists(&query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldDef;

    #[test]
    fn test_dummy_naming() {
        let users = Arc::new(
            Collection::new_auth("users")
                .with_id("_rbc_users")
                .with_field(FieldDef::text("name")),
        );
        let mut record = Record::new(users);
        record.set("verified", true);
        record.set("name", "Ann");

        let dummy = HypotheticalRecord::new(&record);
        let name = &dummy.collection().name;
        assert!(name.starts_with("users__rb_create__"));
        assert_eq!(name.len(), "users__rb_create__".len() + 6);
        assert!(dummy.collection().id.starts_with("_rbc_users__rb_create__"));
        assert!(dummy.record().id().starts_with("__temp_id__"));
        assert!(!dummy.record().get_bool("verified"));
        assert_eq!(dummy.record().get_str("name"), "Ann");
        // the submitted record is untouched
        assert!(record.get_bool("verified"));
    }

    #[test]
    fn test_existing_id_is_kept() {
        let posts = Arc::new(Collection::new("posts"));
        let mut record = Record::new(posts);
        record.set_id("abc123");
        assert_eq!(HypotheticalRecord::new(&record).record().id(), "abc123");
    }

    #[test]
    fn test_query_shape() {
        let posts = Arc::new(Collection::new("posts").with_field(FieldDef::text("title")));
        let mut record = Record::new(posts);
        record.set("title", "hi");
        let dummy = HypotheticalRecord::new(&record);
        let name = dummy.collection().name.clone();

        let query = dummy.query();
        let sql = query.build();
        assert!(sql.starts_with(&format!(
            "WITH \"{}\" AS (SELECT :__rb_create__id AS \"id\", :__rb_create__created AS \"created\"",
            name
        )));
        assert!(sql.ends_with(&format!("SELECT (1) FROM \"{n}\" \"{n}\"", n = name)));
        assert!(query
            .params()
            .iter()
            .any(|(n, v)| n == "__rb_create__title" && v.as_str() == Some("hi")));
    }
}
