//! Error types for expression parsing.

use crate::span::{offset_to_line_col, Span};
use std::fmt::Write;
use thiserror::Error;

/// Error produced while lexing or parsing a filter expression.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Offending range of the expression.
    pub span: Span,
    /// How to fix the expression, when known.
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Render a multi-line diagnostic with the offending fragment of
    /// `source` marked by a caret and tildes.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let mut out = String::new();
        let _ = writeln!(out, "error: {}", self.message);
        let _ = writeln!(out, "  --> line {}:{}", line, col);

        if let Some(text) = source.lines().nth(line - 1) {
            let width = self
                .span
                .slice(source)
                .chars()
                .take_while(|c| *c != '\n')
                .count()
                .max(1);
            let marker = format!("^{}", "~".repeat(width - 1));
            let _ = writeln!(out, "   |\n{:3}| {}", line, text);
            let _ = writeln!(out, "   |{}{}", " ".repeat(col), marker);
        }

        if let Some(hint) = &self.hint {
            let _ = writeln!(out, "   = hint: {}", hint);
        }
        out
    }
}
