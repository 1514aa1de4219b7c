//! Abstract syntax tree for filter and rule expressions.

use crate::span::{Span, Spanned};

/// A boolean filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `left op right`.
    Comparison(Comparison),
    /// Logical AND of expressions.
    And(Vec<Expr>),
    /// Logical OR of expressions.
    Or(Vec<Expr>),
}

impl Expr {
    /// Source span of the whole expression.
    pub fn span(&self) -> Span {
        match self {
            Expr::Comparison(cmp) => cmp.span,
            Expr::And(items) | Expr::Or(items) => items
                .iter()
                .map(Expr::span)
                .reduce(Span::merge)
                .unwrap_or_default(),
        }
    }

    /// Every comparison in the expression, left to right.
    pub fn comparisons(&self) -> Vec<&Comparison> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    fn collect_comparisons<'a>(&'a self, out: &mut Vec<&'a Comparison>) {
        match self {
            Expr::Comparison(cmp) => out.push(cmp),
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_comparisons(out);
                }
            }
        }
    }

    /// Every identifier referenced by the expression, left to right.
    pub fn identifiers(&self) -> Vec<&Spanned<String>> {
        self.comparisons()
            .into_iter()
            .flat_map(|cmp| [&cmp.left, &cmp.right])
            .filter_map(Operand::as_identifier)
            .collect()
    }
}

/// A single binary comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: Operand,
    pub op: Operator,
    pub right: Operand,
    pub span: Span,
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A dotted field path or context macro, optionally modifier-qualified.
    Identifier(Spanned<String>),
    /// A literal value.
    Literal(Spanned<Literal>),
}

impl Operand {
    pub fn span(&self) -> Span {
        match self {
            Operand::Identifier(ident) => ident.span,
            Operand::Literal(lit) => lit.span,
        }
    }

    pub fn as_identifier(&self) -> Option<&Spanned<String>> {
        match self {
            Operand::Identifier(ident) => Some(ident),
            Operand::Literal(_) => None,
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A datetime macro evaluated at compile time (`@now`, `@todayStart`, ...).
    Date(DateMacro),
}

/// Comparison operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Like => "~",
            ComparisonOp::NotLike => "!~",
        }
    }
}

/// A comparison operator together with its quantifier.
///
/// `any` operators (`?=`, `?>`...) match when at least one item of a
/// multi-valued operand satisfies the comparison; plain operators require
/// every item to satisfy it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub op: ComparisonOp,
    pub any: bool,
}

impl Operator {
    pub fn all(op: ComparisonOp) -> Self {
        Self { op, any: false }
    }

    pub fn any(op: ComparisonOp) -> Self {
        Self { op, any: true }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.any {
            write!(f, "?")?;
        }
        write!(f, "{}", self.op.as_str())
    }
}

/// Datetime macros. All are evaluated in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateMacro {
    Now,
    Second,
    Minute,
    Hour,
    Weekday,
    Day,
    Month,
    Year,
    Yesterday,
    Tomorrow,
    TodayStart,
    TodayEnd,
    MonthStart,
    MonthEnd,
    YearStart,
    YearEnd,
}

impl DateMacro {
    /// Look up a macro by its identifier, including the leading `@`.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "@now" => DateMacro::Now,
            "@second" => DateMacro::Second,
            "@minute" => DateMacro::Minute,
            "@hour" => DateMacro::Hour,
            "@weekday" => DateMacro::Weekday,
            "@day" => DateMacro::Day,
            "@month" => DateMacro::Month,
            "@year" => DateMacro::Year,
            "@yesterday" => DateMacro::Yesterday,
            "@tomorrow" => DateMacro::Tomorrow,
            "@todayStart" => DateMacro::TodayStart,
            "@todayEnd" => DateMacro::TodayEnd,
            "@monthStart" => DateMacro::MonthStart,
            "@monthEnd" => DateMacro::MonthEnd,
            "@yearStart" => DateMacro::YearStart,
            "@yearEnd" => DateMacro::YearEnd,
            _ => return None,
        })
    }
}

/// Sort direction for sort expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// A single `sort` item such as `-created`.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub name: String,
    pub direction: SortDirection,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_macro_lookup() {
        assert_eq!(DateMacro::from_name("@now"), Some(DateMacro::Now));
        assert_eq!(DateMacro::from_name("@todayStart"), Some(DateMacro::TodayStart));
        assert_eq!(DateMacro::from_name("@request"), None);
        assert_eq!(DateMacro::from_name("now"), None);
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(Operator::all(ComparisonOp::Ne).to_string(), "!=");
        assert_eq!(Operator::any(ComparisonOp::NotLike).to_string(), "?!~");
    }
}
