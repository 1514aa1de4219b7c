//! Query building: field resolution, filter compilation and search.
//!
//! Expressions are compiled into SQL text that only ever contains quoted
//! schema identifiers, operators and named placeholders. Every value coming
//! from a rule, a client filter or the request context is bound as a
//! parameter.

mod compiler;
mod macros;
mod resolver;
mod search;
mod select;

pub use compiler::compile;
pub use macros::{evaluate_date_macro, format_datetime};
pub use resolver::{Modifier, MultiMatch, RecordFieldResolver, ResolvedField};
pub use search::{
    check_superuser_only_fields, ListResult, SearchParams, SearchProvider, DEFAULT_PER_PAGE,
    MAX_FILTER_LENGTH, MAX_PER_PAGE, MAX_SORT_FIELDS,
};
pub use select::{Join, SelectQuery};

/// Quote an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"alias"."column"`.
pub fn column(alias: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(name))
}
