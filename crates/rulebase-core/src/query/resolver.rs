//! Field resolution with relation traversal and hidden-field visibility.

use super::select::{Join, SelectQuery};
use super::{column, quote_ident};
use crate::catalog::{Catalog, Collection, FieldDef, FieldKind};
use crate::error::{Error, Result};
use crate::record::Value;
use crate::security::RequestInfo;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Value modifiers accepted as a `:suffix` on the last path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Compare every item of a multi-valued field.
    Each,
    /// Number of items of a multi-valued field.
    Length,
    /// Whether the key was submitted (`@request.body.*` only).
    Isset,
    /// Lower-cased text value.
    Lower,
}

impl Modifier {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "each" => Ok(Modifier::Each),
            "length" => Ok(Modifier::Length),
            "isset" => Ok(Modifier::Isset),
            "lower" => Ok(Modifier::Lower),
            other => Err(Error::resolve(format!("unknown modifier ':{}'", other))),
        }
    }
}

/// Per-item subquery of a multi-valued operand.
///
/// Non-quantified comparisons require every row of this subquery to satisfy
/// the comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiMatch {
    /// FROM source with alias, e.g. `"posts" "__mm_posts"`.
    pub from: String,
    pub joins: Vec<Join>,
    /// Expression yielding one item per row.
    pub value: String,
    /// Predicate tying the subquery to the outer row.
    pub correlation: Option<String>,
}

impl MultiMatch {
    pub fn subquery(&self) -> String {
        let mut sql = format!("SELECT {} AS \"v\" FROM {}", self.value, self.from);
        for join in &self.joins {
            sql.push_str(&format!(" LEFT JOIN {} {}", join.source, quote_ident(&join.alias)));
            if let Some(on) = &join.on {
                sql.push_str(" ON ");
                sql.push_str(on);
            }
        }
        if let Some(correlation) = &self.correlation {
            sql.push_str(" WHERE ");
            sql.push_str(correlation);
        }
        sql
    }
}

/// Result of resolving one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedField {
    /// SQL expression: a column reference, a function over one, a named
    /// placeholder or `NULL`.
    pub identifier: String,
    pub multi_match: Option<MultiMatch>,
}

impl ResolvedField {
    fn plain(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            multi_match: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.identifier == "NULL"
    }
}

/// Where a traversed path starts.
#[derive(Debug, Clone)]
enum Root {
    /// The row being filtered.
    Base,
    /// An unrelated `@collection.*` row.
    Detached,
    /// The authenticated record, matched by id placeholder.
    Auth(String),
}

struct Traversal {
    identifier: String,
    multi: bool,
}

/// Resolves expression identifiers against a collection.
///
/// Joins and parameters accumulate in the resolver and are transferred to a
/// [`SelectQuery`] with [`update_query`](Self::update_query). A resolver is
/// created per authorization decision and is never shared across requests.
pub struct RecordFieldResolver<'a> {
    catalog: &'a Catalog,
    base: Arc<Collection>,
    request: &'a RequestInfo,
    allow_hidden: bool,
    joins: Vec<Join>,
    params: Vec<(String, Value)>,
    auth_param: Option<String>,
    now: DateTime<Utc>,
}

impl<'a> RecordFieldResolver<'a> {
    /// Create a resolver for `base`. Hidden fields are resolvable only when
    /// the caller is a superuser.
    pub fn new(catalog: &'a Catalog, base: Arc<Collection>, request: &'a RequestInfo) -> Self {
        Self {
            catalog,
            base,
            request,
            allow_hidden: request.superuser,
            joins: Vec::new(),
            params: Vec::new(),
            auth_param: None,
            now: Utc::now(),
        }
    }

    pub fn with_allow_hidden(mut self, allow: bool) -> Self {
        self.allow_hidden = allow;
        self
    }

    /// Fix the clock used for datetime macros.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn request(&self) -> &RequestInfo {
        self.request
    }

    pub fn base(&self) -> &Arc<Collection> {
        &self.base
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Bind a value and return its placeholder.
    pub fn add_param(&mut self, value: Value) -> String {
        let name = format!("rb{}", self.params.len());
        self.params.push((name.clone(), value));
        format!(":{}", name)
    }

    /// Move accumulated joins and parameters into `query`.
    pub fn update_query(&self, query: &mut SelectQuery) {
        for join in &self.joins {
            query.add_join(join.clone());
        }
        for (name, value) in &self.params {
            query.bind(name, value.clone());
        }
    }

    /// Resolve a field path or context macro.
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedField> {
        if let Some(rest) = path.strip_prefix("@request.") {
            return self.resolve_request(rest, path);
        }
        if let Some(rest) = path.strip_prefix("@collection.") {
            return self.resolve_collection(rest, path);
        }
        if path.starts_with('@') {
            return Err(Error::resolve(format!("unknown macro '{}'", path)));
        }

        let (segments, modifier) = split_path(path)?;
        let base = self.base.clone();
        let alias = base.name.clone();
        self.resolve_fields(&base, &alias, &segments, modifier, Root::Base)
    }

    fn resolve_collection(&mut self, rest: &str, path: &str) -> Result<ResolvedField> {
        let (head, tail) = rest
            .split_once('.')
            .ok_or_else(|| Error::resolve(format!("missing field in '{}'", path)))?;
        let (name, alias_suffix) = match head.split_once(':') {
            Some((name, alias)) => (name, alias),
            None => (head, head),
        };

        let collection = self
            .catalog
            .find(name)
            .ok_or_else(|| Error::resolve(format!("unknown collection '{}'", name)))?;

        let alias = format!("__collection_{}", alias_suffix);
        self.push_join(Join::left(quote_ident(&collection.name), &alias, Some("1=1".into())));

        let (segments, modifier) = split_path(tail)?;
        self.resolve_fields(&collection, &alias, &segments, modifier, Root::Detached)
    }

    fn resolve_request(&mut self, rest: &str, path: &str) -> Result<ResolvedField> {
        let (segments, modifier) = split_path(rest)?;

        let request = self.request;

        match segments.as_slice() {
            ["context"] => self.literal_text(request.context.clone(), modifier),
            ["method"] => self.literal_text(request.method.to_uppercase(), modifier),
            ["headers", name] => {
                let value = request.header(name).map(str::to_string);
                self.literal_opt_text(value, modifier)
            }
            ["query", name] => {
                let value = request.query.get(*name).cloned();
                self.literal_opt_text(value, modifier)
            }
            ["auth", fields @ ..] if !fields.is_empty() => self.resolve_auth(fields, modifier),
            ["body", field] => self.resolve_body(field, modifier),
            ["body", _, ..] => Err(Error::resolve(format!(
                "relation traversal is not supported for '{}'",
                path
            ))),
            _ => Err(Error::resolve(format!("unknown request field '{}'", path))),
        }
    }

    fn resolve_auth(&mut self, segments: &[&str], modifier: Option<Modifier>) -> Result<ResolvedField> {
        let request = self.request;
        let Some(auth) = request.auth.as_ref() else {
            return Ok(ResolvedField::plain("NULL"));
        };
        let collection = auth.collection().clone();

        if let [name] = segments {
            match *name {
                "collectionId" => return self.literal_text(collection.id.clone(), modifier),
                "collectionName" => return self.literal_text(collection.name.clone(), modifier),
                _ => {}
            }

            let field = self.visible_field(&collection, name)?.clone();
            let value = auth.get(name).clone();
            return self.literal_value(&field, value, modifier);
        }

        // traverse relations starting from the stored auth record
        let placeholder = match &self.auth_param {
            Some(p) => p.clone(),
            None => {
                let p = self.add_param(Value::Text(auth.id().to_string()));
                self.auth_param = Some(p.clone());
                p
            }
        };
        let alias = format!("__auth_{}", collection.name);
        self.push_join(Join::left(
            quote_ident(&collection.name),
            &alias,
            Some(format!("{} = {}", column(&alias, "id"), placeholder)),
        ));
        self.resolve_fields(&collection, &alias, segments, modifier, Root::Auth(placeholder))
    }

    fn resolve_body(&mut self, name: &str, modifier: Option<Modifier>) -> Result<ResolvedField> {
        let base = self.base.clone();
        let field = base
            .field(name)
            .ok_or_else(|| Error::resolve(format!("unknown field '{}'", name)))?;

        // the auth password may be checked for presence, never read
        let password_exception = base.is_auth() && name == "password";
        if field.hidden && !self.allow_hidden && !password_exception {
            return Err(hidden_error(&base, name));
        }

        let request = self.request;
        if modifier == Some(Modifier::Isset) {
            let present = request.body.contains_key(name);
            let placeholder = self.add_param(Value::Bool(present));
            return Ok(ResolvedField::plain(placeholder));
        }

        if matches!(field.kind, FieldKind::Password) {
            return Err(Error::resolve(format!(
                "field '{}' can only be used with the :isset modifier",
                name
            )));
        }

        let value = request
            .body
            .get(name)
            .map(|raw| Value::coerce(field, raw))
            .unwrap_or(Value::Null);
        let field = field.clone();
        self.literal_value(&field, value, modifier)
    }

    fn resolve_fields(
        &mut self,
        collection: &Arc<Collection>,
        alias: &str,
        segments: &[&str],
        modifier: Option<Modifier>,
        root: Root,
    ) -> Result<ResolvedField> {
        let mut joins = Vec::new();
        let target = self.traverse(collection, alias, segments, modifier, &mut joins)?;
        for join in joins {
            self.push_join(join);
        }

        // every row of another collection is a candidate match
        let multi = target.multi || matches!(root, Root::Detached);
        if !multi {
            return Ok(ResolvedField::plain(target.identifier));
        }

        // replay the same path under fresh aliases for the per-item subquery
        let mm_alias = format!("__mm_{}", alias);
        let mut mm_joins = Vec::new();
        let mm_target = self.traverse(collection, &mm_alias, segments, modifier, &mut mm_joins)?;
        let correlation = match root {
            Root::Base => Some(format!("{} = {}", column(&mm_alias, "id"), column(alias, "id"))),
            Root::Detached => None,
            Root::Auth(placeholder) => Some(format!("{} = {}", column(&mm_alias, "id"), placeholder)),
        };

        Ok(ResolvedField {
            identifier: target.identifier,
            multi_match: Some(MultiMatch {
                from: format!("{} {}", quote_ident(&collection.name), quote_ident(&mm_alias)),
                joins: mm_joins,
                value: mm_target.identifier,
                correlation,
            }),
        })
    }

    fn traverse(
        &self,
        collection: &Arc<Collection>,
        alias: &str,
        segments: &[&str],
        modifier: Option<Modifier>,
        joins: &mut Vec<Join>,
    ) -> Result<Traversal> {
        let mut current = collection.clone();
        let mut current_alias = alias.to_string();
        let mut multi = false;

        for (i, name) in segments.iter().enumerate() {
            let field = self.visible_field(&current, name)?;
            if matches!(field.kind, FieldKind::Password) {
                return Err(Error::resolve(format!("field '{}' is not filterable", name)));
            }
            let col = column(&current_alias, name);

            if i + 1 == segments.len() {
                return self.apply_modifier(field, col, &current_alias, modifier, multi, joins);
            }

            let target_id = field.relation_target().ok_or_else(|| {
                Error::resolve(format!("'{}' is not a relation field", name))
            })?;
            let target = self.catalog.find_by_id(target_id).ok_or_else(|| {
                Error::resolve(format!("relation '{}' points to a missing collection", name))
            })?;

            let next_alias = format!("{}.{}", current_alias, name);
            if field.is_multiple() {
                let each_alias = format!("{}:each", next_alias);
                joins.push(Join::left(json_each(&col), &each_alias, None));
                joins.push(Join::left(
                    quote_ident(&target.name),
                    &next_alias,
                    Some(format!(
                        "{} = {}.\"value\"",
                        column(&next_alias, "id"),
                        quote_ident(&each_alias)
                    )),
                ));
                multi = true;
            } else {
                joins.push(Join::left(
                    quote_ident(&target.name),
                    &next_alias,
                    Some(format!("{} = {}", column(&next_alias, "id"), col)),
                ));
            }

            current = target;
            current_alias = next_alias;
        }

        Err(Error::resolve("empty field path"))
    }

    fn apply_modifier(
        &self,
        field: &FieldDef,
        col: String,
        alias: &str,
        modifier: Option<Modifier>,
        multi: bool,
        joins: &mut Vec<Join>,
    ) -> Result<Traversal> {
        match modifier {
            None | Some(Modifier::Each) if field.is_multiple() => {
                let each_alias = format!("{}.{}:each", alias, field.name);
                joins.push(Join::left(json_each(&col), &each_alias, None));
                Ok(Traversal {
                    identifier: format!("{}.\"value\"", quote_ident(&each_alias)),
                    multi: true,
                })
            }
            None => Ok(Traversal {
                identifier: col,
                multi,
            }),
            Some(Modifier::Each) => Err(Error::resolve(format!(
                ":each requires a multi-valued field, '{}' is single-valued",
                field.name
            ))),
            Some(Modifier::Length) if field.is_multiple() => Ok(Traversal {
                identifier: format!(
                    "json_array_length(CASE WHEN json_valid({c}) THEN {c} ELSE json_array() END)",
                    c = col
                ),
                multi,
            }),
            Some(Modifier::Length) => Err(Error::resolve(format!(
                ":length requires a multi-valued field, '{}' is single-valued",
                field.name
            ))),
            Some(Modifier::Lower) if field.is_textual() => Ok(Traversal {
                identifier: format!("LOWER({})", col),
                multi,
            }),
            Some(Modifier::Lower) => Err(Error::resolve(format!(
                ":lower requires a text field, '{}' is not",
                field.name
            ))),
            Some(Modifier::Isset) => Err(Error::resolve(
                ":isset is only supported for @request.body fields",
            )),
        }
    }

    fn visible_field<'c>(&self, collection: &'c Collection, name: &str) -> Result<&'c FieldDef> {
        let field = collection.field(name).ok_or_else(|| {
            Error::resolve(format!("unknown field '{}'", name))
        })?;
        if field.hidden && !self.allow_hidden {
            return Err(hidden_error(collection, name));
        }
        Ok(field)
    }

    /// Literal for a field value taken from the request context.
    fn literal_value(
        &mut self,
        field: &FieldDef,
        value: Value,
        modifier: Option<Modifier>,
    ) -> Result<ResolvedField> {
        match modifier {
            None | Some(Modifier::Each) if field.is_multiple() => Ok(self.literal_list(value.to_list())),
            None => Ok(self.literal(value)),
            Some(Modifier::Length) if field.is_multiple() => {
                let len = value.to_list().len() as i64;
                Ok(self.literal(Value::Int(len)))
            }
            Some(Modifier::Lower) if field.is_textual() => {
                let lowered = value.as_str().unwrap_or_default().to_lowercase();
                Ok(self.literal(Value::Text(lowered)))
            }
            Some(m) => Err(Error::resolve(format!(
                "modifier {:?} is not supported for '{}'",
                m, field.name
            ))),
        }
    }

    fn literal_text(&mut self, value: String, modifier: Option<Modifier>) -> Result<ResolvedField> {
        match modifier {
            None => Ok(self.literal(Value::Text(value))),
            Some(Modifier::Lower) => Ok(self.literal(Value::Text(value.to_lowercase()))),
            Some(m) => Err(Error::resolve(format!(
                "modifier {:?} is not supported for request values",
                m
            ))),
        }
    }

    fn literal_opt_text(
        &mut self,
        value: Option<String>,
        modifier: Option<Modifier>,
    ) -> Result<ResolvedField> {
        match value {
            Some(value) => self.literal_text(value, modifier),
            None if modifier.is_none() || modifier == Some(Modifier::Lower) => {
                Ok(ResolvedField::plain("NULL"))
            }
            None => self.literal_text(String::new(), modifier),
        }
    }

    fn literal(&mut self, value: Value) -> ResolvedField {
        if value.is_null() {
            return ResolvedField::plain("NULL");
        }
        ResolvedField::plain(self.add_param(value))
    }

    /// A list literal exposed as a json_each join so that it behaves like a
    /// multi-valued column.
    fn literal_list(&mut self, items: Vec<String>) -> ResolvedField {
        let placeholder = self.add_param(Value::List(items));
        let name = placeholder.trim_start_matches(':');
        let alias = format!("__{}_je", name);
        let mm_alias = format!("__mm_{}_je", name);
        self.push_join(Join::left(format!("json_each({})", placeholder), &alias, None));

        ResolvedField {
            identifier: format!("{}.\"value\"", quote_ident(&alias)),
            multi_match: Some(MultiMatch {
                from: format!("json_each({}) {}", placeholder, quote_ident(&mm_alias)),
                joins: Vec::new(),
                value: format!("{}.\"value\"", quote_ident(&mm_alias)),
                correlation: None,
            }),
        }
    }

    fn push_join(&mut self, join: Join) {
        if !self.joins.iter().any(|j| j.alias == join.alias) {
            self.joins.push(join);
        }
    }
}

fn hidden_error(collection: &Collection, name: &str) -> Error {
    Error::resolve(format!(
        "field '{}' of '{}' is hidden and cannot be used in expressions",
        name, collection.name
    ))
}

fn json_each(col: &str) -> String {
    format!(
        "json_each(CASE WHEN json_valid({c}) THEN {c} ELSE json_array({c}) END)",
        c = col
    )
}

/// Split `a.b.c:modifier` into segments and an optional modifier.
fn split_path(path: &str) -> Result<(Vec<&str>, Option<Modifier>)> {
    let (body, modifier) = match path.split_once(':') {
        Some((body, modifier)) => (body, Some(Modifier::parse(modifier)?)),
        None => (path, None),
    };
    let segments: Vec<&str> = body.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::resolve(format!("invalid field path '{}'", path)));
    }
    Ok((segments, modifier))
}
