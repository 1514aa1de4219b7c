//! Accumulating SELECT statement.

use super::{column, quote_ident};
use crate::catalog::Collection;
use crate::record::Value;

/// A LEFT JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Table or table-valued function expression.
    pub source: String,
    pub alias: String,
    pub on: Option<String>,
}

impl Join {
    pub fn left(source: impl Into<String>, alias: impl Into<String>, on: Option<String>) -> Self {
        Self {
            source: source.into(),
            alias: alias.into(),
            on,
        }
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("LEFT JOIN {} {}", self.source, quote_ident(&self.alias));
        if let Some(on) = &self.on {
            sql.push_str(" ON ");
            sql.push_str(on);
        }
        sql
    }
}

/// A SELECT statement built up by the resolver, the access gate and the
/// search provider.
///
/// Joins are deduplicated by alias and parameters by name, so the same
/// resolver output can be applied more than once.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    ctes: Vec<(String, String)>,
    select: Vec<String>,
    distinct: bool,
    from: Option<(String, String)>,
    joins: Vec<Join>,
    wheres: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: Vec<(String, Value)>,
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT DISTINCT "name".* FROM "name" "name"` for a collection table.
    pub fn records(collection: &Collection) -> Self {
        let alias = quote_ident(&collection.name);
        Self::new()
            .with_select(format!("{}.*", alias))
            .with_distinct(true)
            .with_from(&collection.name, &collection.name)
    }

    pub fn with_select(mut self, expr: impl Into<String>) -> Self {
        self.select.push(expr.into());
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn with_from(mut self, table: &str, alias: &str) -> Self {
        self.from = Some((table.to_string(), alias.to_string()));
        self
    }

    /// Prepend a common table expression `WITH "name" AS (body)`.
    pub fn with_cte(mut self, name: &str, body: impl Into<String>) -> Self {
        self.ctes.push((name.to_string(), body.into()));
        self
    }

    /// Add a join unless one with the same alias already exists.
    pub fn add_join(&mut self, join: Join) -> &mut Self {
        if !self.joins.iter().any(|j| j.alias == join.alias) {
            self.joins.push(join);
        }
        self
    }

    /// AND a predicate into the WHERE clause.
    pub fn and_where(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.wheres.push(predicate.into());
        self
    }

    /// Restrict to the row with the given id.
    pub fn where_id(&mut self, alias: &str, id: &str) -> &mut Self {
        self.and_where(format!("{} = :__rb_id", column(alias, "id")));
        self.bind("__rb_id", Value::Text(id.to_string()))
    }

    pub fn add_order_by(&mut self, term: impl Into<String>) -> &mut Self {
        self.order_by.push(term.into());
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// Bind a named parameter (without the leading `:`), replacing an
    /// existing binding with the same name.
    pub fn bind(&mut self, name: &str, value: Value) -> &mut Self {
        match self.params.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name.to_string(), value)),
        }
        self
    }

    pub fn params(&self) -> &[(String, Value)] {
        &self.params
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn wheres(&self) -> &[String] {
        &self.wheres
    }

    /// Alias of the FROM source.
    pub fn base_alias(&self) -> Option<&str> {
        self.from.as_ref().map(|(_, alias)| alias.as_str())
    }

    /// Render the statement.
    pub fn build(&self) -> String {
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select.join(", ")
        };
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let mut sql = format!("SELECT {}{}", distinct, select);
        self.push_tail(&mut sql, true);
        self.prefix_ctes(sql)
    }

    /// Render `SELECT COUNT(DISTINCT base.id)` over the same source and filters.
    pub fn build_count(&self) -> String {
        let counted = match self.base_alias() {
            Some(alias) => format!("COUNT(DISTINCT {})", column(alias, "id")),
            None => "COUNT(*)".to_string(),
        };
        let mut sql = format!("SELECT {}", counted);
        self.push_tail(&mut sql, false);
        self.prefix_ctes(sql)
    }

    fn push_tail(&self, sql: &mut String, with_paging: bool) {
        if let Some((table, alias)) = &self.from {
            sql.push_str(&format!(" FROM {} {}", quote_ident(table), quote_ident(alias)));
        }
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.to_sql());
        }
        if !self.wheres.is_empty() {
            let predicates: Vec<String> =
                self.wheres.iter().map(|w| format!("({})", w)).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        if !with_paging {
            return;
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
    }

    fn prefix_ctes(&self, sql: String) -> String {
        if self.ctes.is_empty() {
            return sql;
        }
        let ctes: Vec<String> = self
            .ctes
            .iter()
            .map(|(name, body)| format!("{} AS ({})", quote_ident(name), body))
            .collect();
        format!("WITH {} {}", ctes.join(", "), sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_records_query() {
        let posts = Collection::new("posts");
        let mut query = SelectQuery::records(&posts);
        query
            .add_join(Join::left(
                "\"users\"",
                "posts_author",
                Some("\"posts_author\".\"id\" = \"posts\".\"author\"".into()),
            ))
            .and_where("\"posts\".\"title\" = :p0")
            .add_order_by("\"posts\".\"created\" DESC")
            .limit(10)
            .offset(20);

        assert_eq!(
            query.build(),
            "SELECT DISTINCT \"posts\".* FROM \"posts\" \"posts\" \
             LEFT JOIN \"users\" \"posts_author\" ON \"posts_author\".\"id\" = \"posts\".\"author\" \
             WHERE (\"posts\".\"title\" = :p0) ORDER BY \"posts\".\"created\" DESC LIMIT 10 OFFSET 20"
        );
        assert_eq!(
            query.build_count(),
            "SELECT COUNT(DISTINCT \"posts\".\"id\") FROM \"posts\" \"posts\" \
             LEFT JOIN \"users\" \"posts_author\" ON \"posts_author\".\"id\" = \"posts\".\"author\" \
             WHERE (\"posts\".\"title\" = :p0)"
        );
    }

    #[test]
    fn test_joins_deduplicated_by_alias() {
        let mut query = SelectQuery::new();
        query.add_join(Join::left("\"users\"", "a", None));
        query.add_join(Join::left("\"users\"", "a", None));
        query.add_join(Join::left("\"users\"", "b", None));
        assert_eq!(query.joins().len(), 2);
    }

    #[test]
    fn test_bind_replaces_existing() {
        let mut query = SelectQuery::new();
        query.bind("p0", Value::Int(1)).bind("p0", Value::Int(2));
        assert_eq!(query.params(), &[("p0".to_string(), Value::Int(2))]);
    }

    #[test]
    fn test_cte_prefix() {
        let query = SelectQuery::new()
            .with_cte("dummy", "SELECT :a AS \"id\"")
            .with_select("(1)")
            .with_from("dummy", "dummy");
        assert_eq!(
            query.build(),
            "WITH \"dummy\" AS (SELECT :a AS \"id\") SELECT (1) FROM \"dummy\" \"dummy\""
        );
    }
}
