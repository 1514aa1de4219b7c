//! Lexer for filter expressions using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types of the filter language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // Logical operators
    #[token("&&")]
    And,
    #[token("||")]
    Or,

    // Comparison operators
    #[token("=")]
    Eq,
    #[token("!=")]
    Ne,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token("~")]
    Like,
    #[token("!~")]
    NotLike,

    // "At least one item" variants for multi-valued operands
    #[token("?=")]
    AnyEq,
    #[token("?!=")]
    AnyNe,
    #[token("?>")]
    AnyGt,
    #[token("?>=")]
    AnyGe,
    #[token("?<")]
    AnyLt,
    #[token("?<=")]
    AnyLe,
    #[token("?~")]
    AnyLike,
    #[token("?!~")]
    AnyNotLike,

    // Literals
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // Field paths, request/collection macros and date macros
    #[regex(r"@?[a-zA-Z_][a-zA-Z0-9_]*([.:][a-zA-Z0-9_]+)*", |lex| lex.slice().to_string())]
    #[regex(r"`[a-zA-Z0-9_@.:]+`", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| unquote(lex.slice()))]
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| unquote(lex.slice()))]
    String(String),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

impl Token {
    /// Human readable form used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::And => "'&&'".into(),
            Token::Or => "'||'".into(),
            Token::Eq => "'='".into(),
            Token::Ne => "'!='".into(),
            Token::Gt => "'>'".into(),
            Token::Ge => "'>='".into(),
            Token::Lt => "'<'".into(),
            Token::Le => "'<='".into(),
            Token::Like => "'~'".into(),
            Token::NotLike => "'!~'".into(),
            Token::AnyEq => "'?='".into(),
            Token::AnyNe => "'?!='".into(),
            Token::AnyGt => "'?>'".into(),
            Token::AnyGe => "'?>='".into(),
            Token::AnyLt => "'?<'".into(),
            Token::AnyLe => "'?<='".into(),
            Token::AnyLike => "'?~'".into(),
            Token::AnyNotLike => "'?!~'".into(),
            Token::True => "'true'".into(),
            Token::False => "'false'".into(),
            Token::Null => "'null'".into(),
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::String(_) => "string literal".into(),
            Token::Int(_) | Token::Float(_) => "number".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// Unescape a string literal body.
/// Strip the surrounding quotes and resolve backslash escapes. Unknown
/// escapes are kept verbatim.
fn unquote(quoted: &str) -> String {
    let body = &quoted[1..quoted.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut escaped = false;

    for c in body.chars() {
        if !escaped {
            if c == '\\' {
                escaped = true;
            } else {
                out.push(c);
            }
            continue;
        }
        escaped = false;
        match c {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            '\\' | '"' | '\'' => out.push(c),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    if escaped {
        out.push('\\');
    }
    out
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Lexer producing spanned tokens or a [`ParseError`] for unrecognized input.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    peeked: Option<Option<Result<SpannedToken, ParseError>>>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> Result<Option<&SpannedToken>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_inner());
        }
        match self.peeked.as_ref() {
            Some(Some(Ok(token))) => Ok(Some(token)),
            Some(Some(Err(err))) => Err(err.clone()),
            _ => Ok(None),
        }
    }

    /// Consume the next token.
    pub fn next_token(&mut self) -> Result<Option<SpannedToken>, ParseError> {
        let next = match self.peeked.take() {
            Some(peeked) => peeked,
            None => self.next_inner(),
        };
        next.transpose()
    }

    fn next_inner(&mut self) -> Option<Result<SpannedToken, ParseError>> {
        let result = self.inner.next()?;
        let span: Span = self.inner.span().into();
        Some(match result {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(self.invalid_token(span)),
        })
    }

    fn invalid_token(&self, span: Span) -> ParseError {
        let fragment = span.slice(self.inner.source());
        if fragment.starts_with('"') || fragment.starts_with('\'') {
            let end = self.inner.source().len();
            ParseError::new("unterminated string literal", Span::new(span.start, end))
                .with_hint("close the string with a matching quote")
        } else if fragment.starts_with('`') {
            ParseError::new("unterminated quoted identifier", span)
        } else if fragment == "!" || fragment == "?" {
            ParseError::new(format!("unknown operator '{}'", fragment), span)
                .with_hint("supported operators are = != > >= < <= ~ !~ and their ? variants")
        } else {
            ParseError::new(format!("unexpected character '{}'", fragment), span)
        }
    }

    /// Offset one past the end of the source.
    pub fn end(&self) -> usize {
        self.inner.source().len()
    }

    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<SpannedToken, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Tokenize a whole expression, stopping at the first invalid token.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    Lexer::new(source).collect()
}
