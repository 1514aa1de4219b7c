//! Rulebase expression language
//!
//! Parser for the boolean expressions used both as collection access rules
//! and as client supplied list filters.
//!
//! # Syntax
//!
//! ```text
//! status = 'published'
//! @request.auth.id != '' && author = @request.auth.id
//! (views > 100 || featured = true) && created >= @todayStart
//! tags:each ?= 'rust'
//! @collection.members.user ?= @request.auth.id
//! title ~ 'draft' // line comments are ignored
//! ```
//!
//! Operators: `= != > >= < <= ~ !~` plus the "at least one" variants
//! `?= ?!= ?> ?>= ?< ?<= ?~ ?!~` for multi-valued operands. `&&` binds tighter
//! than `||`.
//!
//! The parser only validates the shape of the expression. Identifiers are
//! resolved later against a collection schema.
//!
//! # Usage
//!
//! ```rust
//! use rulebase_lang::{parse, parse_sort, Expr};
//!
//! let expr = parse("author = @request.auth.id && status != 'draft'").unwrap();
//! assert!(matches!(expr, Expr::And(_)));
//!
//! let sort = parse_sort("-created,title").unwrap();
//! assert_eq!(sort.len(), 2);
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

pub use ast::{
    Comparison, ComparisonOp, DateMacro, Expr, Literal, Operand, Operator, SortDirection,
    SortField,
};
pub use error::ParseError;
pub use lexer::{tokenize, SpannedToken, Token};
pub use span::{Span, Spanned};

/// Parse a filter or rule expression into an AST.
///
/// # Example
///
/// ```rust
/// use rulebase_lang::parse;
///
/// let expr = parse("title ~ 'rust'").unwrap();
/// assert_eq!(expr.comparisons().len(), 1);
/// ```
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    parser::parse(source)
}

/// Parse a comma separated sort expression (`-created,+title`).
pub fn parse_sort(source: &str) -> Result<Vec<SortField>, ParseError> {
    parser::parse_sort(source)
}
