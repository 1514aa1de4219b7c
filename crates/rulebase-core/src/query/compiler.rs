//! Compiles expression ASTs into parameterized SQL predicates.

use super::macros::evaluate_date_macro;
use super::resolver::{RecordFieldResolver, ResolvedField};
use crate::error::Result;
use crate::record::Value;
use rulebase_lang::{Comparison, ComparisonOp, Expr, Literal, Operand};

/// Compile `expr` into a SQL predicate.
///
/// Joins and parameters required by the predicate are accumulated in the
/// resolver. The returned SQL never contains caller supplied text.
pub fn compile(expr: &Expr, resolver: &mut RecordFieldResolver<'_>) -> Result<String> {
    match expr {
        Expr::Comparison(cmp) => compile_comparison(cmp, resolver),
        Expr::And(items) => compile_group(items, " AND ", resolver),
        Expr::Or(items) => compile_group(items, " OR ", resolver),
    }
}

fn compile_group(
    items: &[Expr],
    separator: &str,
    resolver: &mut RecordFieldResolver<'_>,
) -> Result<String> {
    let parts = items
        .iter()
        .map(|item| compile(item, resolver))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("({})", parts.join(separator)))
}

fn compile_comparison(cmp: &Comparison, resolver: &mut RecordFieldResolver<'_>) -> Result<String> {
    let like = matches!(cmp.op.op, ComparisonOp::Like | ComparisonOp::NotLike);
    let left = resolve_operand(&cmp.left, resolver, false)?;
    let right = resolve_operand(&cmp.right, resolver, like)?;

    let mut sql = compare(cmp.op.op, &left.identifier, &right);

    // without the `?` quantifier every item of a multi-valued side must match
    if !cmp.op.any {
        if let Some(mm) = &left.multi_match {
            let inner = compare(cmp.op.op, "\"__mml\".\"v\"", &right);
            sql = format!(
                "{} AND NOT EXISTS (SELECT 1 FROM ({}) \"__mml\" WHERE NOT ({}))",
                sql,
                mm.subquery(),
                inner
            );
        }
        if let Some(mm) = &right.multi_match {
            let item = Resolved {
                identifier: "\"__mmr\".\"v\"".to_string(),
                pattern_literal: right.pattern_literal,
                multi_match: None,
            };
            let inner = compare(cmp.op.op, &left.identifier, &item);
            sql = format!(
                "{} AND NOT EXISTS (SELECT 1 FROM ({}) \"__mmr\" WHERE NOT ({}))",
                sql,
                mm.subquery(),
                inner
            );
        }
    }

    Ok(format!("({})", sql))
}

struct Resolved {
    identifier: String,
    /// The right side is a bound pattern that already carries its `%` wildcards.
    pattern_literal: bool,
    multi_match: Option<super::resolver::MultiMatch>,
}

impl From<ResolvedField> for Resolved {
    fn from(field: ResolvedField) -> Self {
        Self {
            identifier: field.identifier,
            pattern_literal: false,
            multi_match: field.multi_match,
        }
    }
}

fn resolve_operand(
    operand: &Operand,
    resolver: &mut RecordFieldResolver<'_>,
    like_pattern: bool,
) -> Result<Resolved> {
    let literal = match operand {
        Operand::Identifier(ident) => return Ok(resolver.resolve(&ident.value)?.into()),
        Operand::Literal(lit) => &lit.value,
    };

    let value = match literal {
        Literal::Null => {
            return Ok(Resolved {
                identifier: "NULL".to_string(),
                pattern_literal: false,
                multi_match: None,
            })
        }
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(n) => Value::Float(*n),
        Literal::String(s) if like_pattern => {
            let pattern = if s.contains('%') {
                s.clone()
            } else {
                format!("%{}%", escape_like(s))
            };
            return Ok(Resolved {
                identifier: resolver.add_param(Value::Text(pattern)),
                pattern_literal: true,
                multi_match: None,
            });
        }
        Literal::String(s) => Value::Text(s.clone()),
        Literal::Date(m) => evaluate_date_macro(*m, resolver.now()),
    };

    Ok(Resolved {
        identifier: resolver.add_param(value),
        pattern_literal: false,
        multi_match: None,
    })
}

fn compare(op: ComparisonOp, left: &str, right: &Resolved) -> String {
    let r = right.identifier.as_str();
    match op {
        ComparisonOp::Eq if r == "NULL" => format!("({l} = '' OR {l} IS NULL)", l = left),
        ComparisonOp::Eq if left == "NULL" => format!("({r} = '' OR {r} IS NULL)", r = r),
        ComparisonOp::Eq => format!("COALESCE({}, '') = COALESCE({}, '')", left, r),
        ComparisonOp::Ne if r == "NULL" => {
            format!("({l} != '' AND {l} IS NOT NULL)", l = left)
        }
        ComparisonOp::Ne if left == "NULL" => {
            format!("({r} != '' AND {r} IS NOT NULL)", r = r)
        }
        ComparisonOp::Ne => format!("COALESCE({}, '') != COALESCE({}, '')", left, r),
        ComparisonOp::Gt => format!("{} > {}", left, r),
        ComparisonOp::Ge => format!("{} >= {}", left, r),
        ComparisonOp::Lt => format!("{} < {}", left, r),
        ComparisonOp::Le => format!("{} <= {}", left, r),
        ComparisonOp::Like => format!("{} LIKE {} ESCAPE '\\'", left, like_rhs(right)),
        ComparisonOp::NotLike => format!("{} NOT LIKE {} ESCAPE '\\'", left, like_rhs(right)),
    }
}

fn like_rhs(right: &Resolved) -> String {
    if right.pattern_literal {
        right.identifier.clone()
    } else {
        format!("('%' || {} || '%')", right.identifier)
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
