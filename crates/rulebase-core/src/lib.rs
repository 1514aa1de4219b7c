//! rulebase core - collection catalog, rule compilation, access gate and
//! record store.
//!
//! Rules and client filters are parsed by `rulebase-lang`, resolved against
//! the collection catalog and compiled into parameterized SQLite predicates.

pub mod catalog;
pub mod error;
pub mod query;
pub mod record;
pub mod security;
pub mod store;

pub use catalog::{
    Catalog, Collection, CollectionType, FieldDef, FieldKind, Rule, RuleAction, RuleKind,
};
pub use error::{Error, Result};
pub use query::{
    compile, ListResult, RecordFieldResolver, ResolvedField, SearchParams, SearchProvider,
    SelectQuery,
};
pub use record::{generate_id, Record, Value};
pub use store::{Store, StoreConfig};

// Security exports
pub use security::{
    apply_rule, authorize, ensure_not_locked, has_manage_access, Access, Audience,
    HypotheticalRecord, ManageTarget, RateLimitRule, RateLimitSettings, RateLimiter, RequestInfo,
};

/// Re-export the expression language.
pub use rulebase_lang as lang;
