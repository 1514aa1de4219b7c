//! Manage-rule escalation for auth collections.
//!
//! A caller satisfying an auth collection's manage rule may set fields that
//! are otherwise reserved for superusers (email, verified, password) on the
//! target record.

use crate::catalog::{Catalog, Collection, RuleAction, RuleKind};
use crate::error::Result;
use crate::query::{compile, RecordFieldResolver, SelectQuery};
use crate::record::Record;
use crate::security::{HypotheticalRecord, RequestInfo};
use crate::store::Store;
use std::sync::Arc;
use tracing::error;

/// Record whose management is being checked.
#[derive(Debug, Clone, Copy)]
pub enum ManageTarget<'r> {
    /// A stored record, matched by id against its table.
    Existing(&'r Record),
    /// A record being created, checked against its single-row projection.
    Hypothetical(&'r HypotheticalRecord),
}

/// Whether the caller may manage `target`.
///
/// False for base collections, for absent or empty manage rules and for
/// unauthenticated callers. Evaluation failures are logged and treated as a
/// denial.
pub fn has_manage_access(
    store: &Store,
    catalog: &Catalog,
    request: &RequestInfo,
    collection: &Arc<Collection>,
    target: ManageTarget<'_>,
) -> bool {
    if !collection.is_auth() || request.auth.is_none() {
        return false;
    }
    let RuleKind::Expr(rule) = collection.rule(RuleAction::Manage).kind() else {
        return false;
    };

    let outcome = match target {
        ManageTarget::Existing(record) => check_existing(store, catalog, request, collection, record, rule),
        ManageTarget::Hypothetical(dummy) => dummy.check(store, catalog, request, rule),
    };

    match outcome {
        Ok(granted) => granted,
        Err(err) => {
            error!(collection_id = %collection.id, error = %err, "manage rule check failed");
            false
        }
    }
}

fn check_existing(
    store: &Store,
    catalog: &Catalog,
    request: &RequestInfo,
    collection: &Arc<Collection>,
    record: &Record,
    rule: &str,
) -> Result<bool> {
    let expr = rulebase_lang::parse(rule)?;
    let mut resolver = RecordFieldResolver::new(catalog, collection.clone(), request);
    let predicate = compile(&expr, &mut resolver)?;

    let mut query = SelectQuery::new()
        .with_select("(1)")
        .with_from(&collection.name, &collection.name);
    query
        .where_id(&collection.name, record.id())
        .and_where(predicate)
        .limit(1);
    resolver.update_query(&mut query);

    store.exists(&query)
}
