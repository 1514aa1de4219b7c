//! Access gate: turns a rule slot into an access decision.

use crate::catalog::{Rule, RuleKind};
use crate::error::{Error, Result};
use crate::query::{compile, RecordFieldResolver, SelectQuery};
use crate::security::RequestInfo;

/// Message returned when a locked rule is hit by a non-superuser.
pub const ONLY_SUPERUSERS: &str = "Only superusers can perform this action.";

/// Outcome of authorizing a rule for a caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    /// No restriction applies.
    Unrestricted,
    /// Only rows matching the compiled predicate are accessible.
    Filtered(String),
}

/// Fail with [`Error::Forbidden`] when the rule is absent and the caller is
/// not a superuser.
pub fn ensure_not_locked(rule: &Rule, request: &RequestInfo) -> Result<()> {
    if rule.kind() == RuleKind::Locked && !request.superuser {
        return Err(Error::Forbidden(ONLY_SUPERUSERS.to_string()));
    }
    Ok(())
}

/// Authorize `rule` for the resolver's caller.
///
/// | rule | superuser | result |
/// |---|---|---|
/// | absent | yes | unrestricted |
/// | absent | no | forbidden |
/// | empty | any | unrestricted |
/// | expression | yes | unrestricted |
/// | expression | no | filtered by the compiled expression |
///
/// Any parse or resolve failure is returned as an error and must be treated
/// as a denial.
pub fn authorize(rule: &Rule, resolver: &mut RecordFieldResolver<'_>) -> Result<Access> {
    let superuser = resolver.request().superuser;

    match rule.kind() {
        RuleKind::Locked if superuser => Ok(Access::Unrestricted),
        RuleKind::Locked => Err(Error::Forbidden(ONLY_SUPERUSERS.to_string())),
        RuleKind::Public => Ok(Access::Unrestricted),
        RuleKind::Expr(_) if superuser => Ok(Access::Unrestricted),
        RuleKind::Expr(source) => {
            let expr = rulebase_lang::parse(source)?;
            let predicate = compile(&expr, resolver)?;
            Ok(Access::Filtered(predicate))
        }
    }
}

/// Authorize `rule` and AND the resulting predicate into `query`.
pub fn apply_rule(
    rule: &Rule,
    resolver: &mut RecordFieldResolver<'_>,
    query: &mut SelectQuery,
) -> Result<()> {
    if let Access::Filtered(predicate) = authorize(rule, resolver)? {
        query.and_where(predicate);
    }
    resolver.update_query(query);
    Ok(())
}
