//! Recursive descent parser for filter expressions.
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := primary ( "&&" primary )*
//! primary    := "(" expr ")" | comparison
//! comparison := operand operator operand
//! operand    := identifier | string | number | true | false | null
//! ```

use crate::ast::{
    Comparison, ComparisonOp, DateMacro, Expr, Literal, Operand, Operator, SortDirection,
    SortField,
};
use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::{Span, Spanned};

/// Maximum nesting of parenthesized groups.
pub const MAX_DEPTH: usize = 64;

/// Parser over a single expression string.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    depth: usize,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            depth: 0,
        }
    }

    /// Parse the complete input as one expression.
    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        if self.lexer.peek()?.is_none() {
            return Err(ParseError::new(
                "empty expression",
                Span::new(0, self.lexer.end()),
            ));
        }

        let expr = self.parse_or()?;

        if let Some(tok) = self.lexer.next_token()? {
            let hint = match tok.token {
                Token::RParen => "remove the unmatched ')'",
                _ => "join conditions with '&&' or '||'",
            };
            return Err(
                ParseError::new(format!("unexpected {}", tok.token.describe()), tok.span)
                    .with_hint(hint),
            );
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;

        while self.peek_is(&Token::Or)? {
            self.next_token()?; // consume ||

            let right = self.parse_and()?;
            left = match left {
                Expr::Or(mut items) => {
                    items.push(right);
                    Expr::Or(items)
                }
                _ => Expr::Or(vec![left, right]),
            };
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_primary()?;

        while self.peek_is(&Token::And)? {
            self.next_token()?; // consume &&

            let right = self.parse_primary()?;
            left = match left {
                Expr::And(mut items) => {
                    items.push(right);
                    Expr::And(items)
                }
                _ => Expr::And(vec![left, right]),
            };
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if !self.peek_is(&Token::LParen)? {
            return self.parse_comparison().map(Expr::Comparison);
        }

        let open = self.next_token()?;
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new("expression is nested too deeply", open.span));
        }

        if self.peek_is(&Token::RParen)? {
            return Err(ParseError::new("empty group", open.span));
        }

        let inner = self.parse_or()?;

        match self.lexer.next_token()? {
            Some(SpannedToken {
                token: Token::RParen,
                ..
            }) => {}
            Some(tok) => {
                return Err(ParseError::new(
                    format!("expected ')' but found {}", tok.token.describe()),
                    tok.span,
                )
                .with_hint("check that every '(' has a matching ')'"));
            }
            None => {
                return Err(ParseError::new("unclosed '('", open.span)
                    .with_hint("check that every '(' has a matching ')'"));
            }
        }

        self.depth -= 1;
        Ok(inner)
    }

    fn parse_comparison(&mut self) -> Result<Comparison, ParseError> {
        let left = self.parse_operand()?;

        let op_tok = self.next_token()?;
        let op = operator_for(&op_tok.token).ok_or_else(|| {
            ParseError::new(
                format!("expected comparison operator but found {}", op_tok.token.describe()),
                op_tok.span,
            )
        })?;

        let right = self.parse_operand()?;
        let span = left.span().merge(right.span());

        Ok(Comparison {
            left,
            op,
            right,
            span,
        })
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        let tok = self.next_token()?;
        let span = tok.span;

        let literal = match tok.token {
            Token::Ident(name) => {
                return Ok(match DateMacro::from_name(&name) {
                    Some(date) => Operand::Literal(Spanned::new(Literal::Date(date), span)),
                    None => Operand::Identifier(Spanned::new(name, span)),
                });
            }
            Token::String(s) => Literal::String(s),
            Token::Int(n) => Literal::Int(n),
            Token::Float(n) => Literal::Float(n),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::Null => Literal::Null,
            other => {
                return Err(ParseError::new(
                    format!("expected field or value but found {}", other.describe()),
                    span,
                ));
            }
        };

        Ok(Operand::Literal(Spanned::new(literal, span)))
    }

    fn peek_is(&mut self, token: &Token) -> Result<bool, ParseError> {
        Ok(self
            .lexer
            .peek()?
            .is_some_and(|tok| std::mem::discriminant(&tok.token) == std::mem::discriminant(token)))
    }

    fn next_token(&mut self) -> Result<SpannedToken, ParseError> {
        let end = self.lexer.end();
        self.lexer
            .next_token()?
            .ok_or_else(|| ParseError::new("unexpected end of input", Span::new(end, end)))
    }
}

fn operator_for(token: &Token) -> Option<Operator> {
    Some(match token {
        Token::Eq => Operator::all(ComparisonOp::Eq),
        Token::Ne => Operator::all(ComparisonOp::Ne),
        Token::Gt => Operator::all(ComparisonOp::Gt),
        Token::Ge => Operator::all(ComparisonOp::Ge),
        Token::Lt => Operator::all(ComparisonOp::Lt),
        Token::Le => Operator::all(ComparisonOp::Le),
        Token::Like => Operator::all(ComparisonOp::Like),
        Token::NotLike => Operator::all(ComparisonOp::NotLike),
        Token::AnyEq => Operator::any(ComparisonOp::Eq),
        Token::AnyNe => Operator::any(ComparisonOp::Ne),
        Token::AnyGt => Operator::any(ComparisonOp::Gt),
        Token::AnyGe => Operator::any(ComparisonOp::Ge),
        Token::AnyLt => Operator::any(ComparisonOp::Lt),
        Token::AnyLe => Operator::any(ComparisonOp::Le),
        Token::AnyLike => Operator::any(ComparisonOp::Like),
        Token::AnyNotLike => Operator::any(ComparisonOp::NotLike),
        _ => return None,
    })
}

/// Parse a filter expression.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    Parser::new(source).parse_expr()
}

/// Parse a comma separated sort expression such as `-created,title`.
///
/// Each item is a field path optionally prefixed by `+` (ascending, the
/// default) or `-` (descending). Blank items are skipped.
pub fn parse_sort(source: &str) -> Result<Vec<SortField>, ParseError> {
    let mut fields = Vec::new();
    let mut offset = 0;

    for raw in source.split(',') {
        let start = offset + (raw.len() - raw.trim_start().len());
        offset += raw.len() + 1;

        let item = raw.trim();
        if item.is_empty() {
            continue;
        }

        let (direction, name) = match item.as_bytes()[0] {
            b'-' => (SortDirection::Desc, &item[1..]),
            b'+' => (SortDirection::Asc, &item[1..]),
            _ => (SortDirection::Asc, item),
        };
        let span = Span::new(start, start + item.len());

        if !is_valid_sort_name(name) {
            return Err(ParseError::new(format!("invalid sort field '{}'", name), span));
        }

        fields.push(SortField {
            name: name.to_string(),
            direction,
            span,
        });
    }

    Ok(fields)
}

fn is_valid_sort_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = match chars.next() {
        Some('@') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        Some(c) => c.is_ascii_alphanumeric() || c == '_',
        None => false,
    };
    first_ok
        && name[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':'))
}
