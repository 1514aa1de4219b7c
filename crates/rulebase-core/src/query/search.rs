//! List search: client filter, sort and pagination.

use super::compiler::compile;
use super::resolver::RecordFieldResolver;
use super::select::SelectQuery;
use super::column;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::store::Store;
use rulebase_lang::{parse, parse_sort, SortDirection};
use serde::Serialize;
use std::collections::BTreeMap;

/// Page size used when the request does not specify one.
pub const DEFAULT_PER_PAGE: usize = 30;
/// Upper bound for `perPage`.
pub const MAX_PER_PAGE: usize = 1000;
/// Longest accepted client filter.
pub const MAX_FILTER_LENGTH: usize = 3500;
/// Most sort items accepted in one request.
pub const MAX_SORT_FIELDS: usize = 8;

/// Paginated list envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: usize,
    pub per_page: usize,
    /// -1 when totals were skipped.
    pub total_items: i64,
    /// -1 when totals were skipped.
    pub total_pages: i64,
    pub items: Vec<T>,
}

impl<T> ListResult<T> {
    pub fn map_items<U>(self, f: impl FnMut(T) -> U) -> ListResult<U> {
        ListResult {
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            items: self.items.into_iter().map(f).collect(),
        }
    }
}

/// Search parameters parsed from a request query string.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub page: usize,
    pub per_page: usize,
    pub skip_total: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            filter: None,
            sort: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            skip_total: false,
        }
    }
}

impl SearchParams {
    /// Read `filter`, `sort`, `page`, `perPage` and `skipTotal`.
    ///
    /// Invalid numbers fall back to defaults; `perPage` is clamped to
    /// `1..=max_per_page`.
    pub fn from_query(
        query: &BTreeMap<String, String>,
        default_per_page: usize,
        max_per_page: usize,
    ) -> Result<Self> {
        let non_empty = |key: &str| {
            query
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let filter = non_empty("filter");
        if filter.as_ref().is_some_and(|f| f.len() > MAX_FILTER_LENGTH) {
            return Err(Error::resolve(format!(
                "filter must be at most {} characters",
                MAX_FILTER_LENGTH
            )));
        }

        let page = non_empty("page")
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1);
        let per_page = non_empty("perPage")
            .and_then(|p| p.parse::<usize>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(default_per_page)
            .min(max_per_page)
            .max(1);
        let skip_total = non_empty("skipTotal")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "t"));

        Ok(Self {
            filter,
            sort: non_empty("sort"),
            page,
            per_page,
            skip_total,
        })
    }
}

/// Reject client filter/sort references that only superusers may use.
///
/// `@collection.*` and `@request.*` in a client expression could be used to
/// probe other collections or the request context.
pub fn check_superuser_only_fields(filter: Option<&str>, sort: Option<&str>) -> Result<()> {
    const RESTRICTED: [&str; 2] = ["@collection.", "@request."];
    let is_restricted = |name: &str| RESTRICTED.iter().any(|prefix| name.starts_with(prefix));

    if let Some(filter) = filter {
        let expr = parse(filter)?;
        if let Some(ident) = expr.identifiers().into_iter().find(|i| is_restricted(&i.value)) {
            return Err(Error::resolve(format!(
                "only superusers can filter by '{}'",
                ident.value
            )));
        }
    }

    if let Some(sort) = sort {
        if let Some(field) = parse_sort(sort)?.into_iter().find(|f| is_restricted(&f.name)) {
            return Err(Error::resolve(format!(
                "only superusers can sort by '{}'",
                field.name
            )));
        }
    }

    Ok(())
}

/// Applies search parameters to a base records query and executes it.
pub struct SearchProvider<'r, 'a> {
    resolver: &'r mut RecordFieldResolver<'a>,
    query: SelectQuery,
    params: SearchParams,
}

impl<'r, 'a> SearchProvider<'r, 'a> {
    /// `query` is the records query of the resolver's base collection,
    /// typically already narrowed by the list rule.
    pub fn new(resolver: &'r mut RecordFieldResolver<'a>, query: SelectQuery) -> Self {
        Self {
            resolver,
            query,
            params: SearchParams::default(),
        }
    }

    pub fn with_params(mut self, params: SearchParams) -> Self {
        self.params = params;
        self
    }

    /// Compile filter and sort into the query without executing it.
    pub fn build(mut self) -> Result<(SelectQuery, SearchParams)> {
        if let Some(filter) = self.params.filter.as_deref() {
            let expr = parse(filter)?;
            let predicate = compile(&expr, self.resolver)?;
            self.query.and_where(predicate);
        }

        if let Some(sort) = self.params.sort.as_deref() {
            let fields = parse_sort(sort)?;
            if fields.len() > MAX_SORT_FIELDS {
                return Err(Error::resolve(format!(
                    "at most {} sort fields are allowed",
                    MAX_SORT_FIELDS
                )));
            }
            let alias = self.resolver.base().name.clone();
            for field in fields {
                let expr = match field.name.as_str() {
                    "@random" => "RANDOM()".to_string(),
                    "@rowid" => column(&alias, "rowid"),
                    name => self.resolver.resolve(name)?.identifier,
                };
                let direction = match field.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                self.query.add_order_by(format!("{} {}", expr, direction));
            }
        }

        self.resolver.update_query(&mut self.query);
        Ok((self.query, self.params))
    }

    /// Execute the search and return one page of records.
    pub fn exec(self, store: &Store) -> Result<ListResult<Record>> {
        let collection = self.resolver.base().clone();
        let (mut query, params) = self.build()?;

        let (total_items, total_pages) = if params.skip_total {
            (-1, -1)
        } else {
            let total = i64::try_from(store.count(&query)?).unwrap_or(i64::MAX);
            let per_page = i64::try_from(params.per_page).unwrap_or(i64::MAX).max(1);
            let pages = if total == 0 { 0 } else { (total - 1) / per_page + 1 };
            (total, pages)
        };

        // SQLite takes LIMIT and OFFSET as signed 64-bit integers
        let max = i64::MAX as u64;
        let limit = (params.per_page as u64).min(max);
        let offset = (params.page.saturating_sub(1) as u64)
            .saturating_mul(limit)
            .min(max);
        query.limit(limit).offset(offset);
        let items = store.find_records(&collection, &query)?;

        Ok(ListResult {
            page: params.page,
            per_page: params.per_page,
            total_items,
            total_pages,
            items,
        })
    }
}
