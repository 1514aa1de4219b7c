//! Core error types.

use rulebase_lang::ParseError;
use thiserror::Error;

/// Errors raised by the rule engine and the record store.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed filter or rule expression.
    #[error("invalid expression: {0}")]
    Parse(#[from] ParseError),

    /// Unknown field, hidden field access or a disallowed filter/sort target.
    #[error("{0}")]
    Resolve(String),

    /// The caller may not perform the operation at all.
    #[error("{0}")]
    Forbidden(String),

    /// Record missing or filtered out by a rule.
    #[error("record not found")]
    NotFound,

    /// Submitted data failed validation.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Collection schema problem.
    #[error("schema error: {0}")]
    Schema(String),

    /// SQLite error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// JSON encoding or decoding error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn resolve(message: impl Into<String>) -> Self {
        Error::Resolve(message.into())
    }

    /// HTTP-style status code for the error class.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Parse(_) | Error::Resolve(_) | Error::InvalidData(_) => 400,
            Error::Forbidden(_) => 403,
            Error::NotFound => 404,
            Error::Schema(_) | Error::Storage(_) | Error::Serialization(_) => 500,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
