//! API errors and their HTTP-style responses.

use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;

/// Generic message for 400 responses caused by malformed input.
pub const MSG_BAD_REQUEST: &str = "Something went wrong while processing your request.";
/// Message for missing or rule-filtered records.
pub const MSG_NOT_FOUND: &str = "The requested resource wasn't found.";
/// Message for exhausted rate limits.
pub const MSG_TOO_MANY_REQUESTS: &str = "Too Many Requests.";
/// Generic message for internal failures; details are only logged.
pub const MSG_INTERNAL: &str = "Something went wrong while processing your request.";

/// Result type for API operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors returned by the record API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Malformed filter, unresolvable field or invalid submitted data.
    #[error("{message}")]
    BadRequest {
        message: String,
        /// Per-field validation errors.
        data: Map<String, JsonValue>,
        /// Raw cause, exposed only in dev mode.
        detail: Option<String>,
    },

    /// Absent rule and non-superuser caller.
    #[error("{0}")]
    Forbidden(String),

    /// Missing record, or a record filtered out by a rule.
    #[error("{0}")]
    NotFound(String),

    /// Rate limit exhausted.
    #[error("Too Many Requests.")]
    TooManyRequests,

    /// Failure unrelated to authorization. The cause is never sent to the
    /// caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            data: Map::new(),
            detail: None,
        }
    }

    pub fn not_found() -> Self {
        ApiError::NotFound(MSG_NOT_FOUND.to_string())
    }

    /// Attach the raw cause to a bad request error. No-op for other kinds.
    pub fn with_detail(mut self, cause: impl ToString) -> Self {
        if let ApiError::BadRequest { detail, .. } = &mut self {
            *detail = Some(cause.to_string());
        }
        self
    }

    /// Attach a field validation error to a bad request error.
    pub fn with_field_error(mut self, field: &str, code: &str, message: &str) -> Self {
        if let ApiError::BadRequest { data, .. } = &mut self {
            data.insert(
                field.to_string(),
                json!({ "code": code, "message": message }),
            );
        }
        self
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TooManyRequests => 429,
            ApiError::Internal(_) => 500,
        }
    }

    /// Serialize the error into the `{status, message, data}` envelope.
    pub fn to_response(&self, dev_mode: bool) -> ApiResponse {
        let status = self.status_code();
        let (message, data) = match self {
            ApiError::BadRequest {
                message,
                data,
                detail,
            } => {
                let message = match detail {
                    Some(detail) if dev_mode => format!("{} {}", message, detail),
                    _ => message.clone(),
                };
                (message, data.clone())
            }
            ApiError::Internal(cause) if dev_mode => (format!("{} {}", MSG_INTERNAL, cause), Map::new()),
            ApiError::Internal(_) => (MSG_INTERNAL.to_string(), Map::new()),
            other => (other.to_string(), Map::new()),
        };

        ApiResponse::json(
            status,
            json!({
                "status": status,
                "message": message,
                "data": data,
            }),
        )
    }
}

impl From<rulebase_core::Error> for ApiError {
    fn from(err: rulebase_core::Error) -> Self {
        use rulebase_core::Error;

        match err {
            Error::Parse(_) | Error::Resolve(_) => {
                ApiError::bad_request(MSG_BAD_REQUEST).with_detail(err)
            }
            Error::InvalidData(ref message) => {
                ApiError::bad_request("Failed to validate the submitted data.").with_detail(message)
            }
            Error::Forbidden(message) => ApiError::Forbidden(message),
            Error::NotFound => ApiError::not_found(),
            Error::Schema(_) | Error::Storage(_) | Error::Serialization(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

/// An HTTP-style response produced by the record API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    /// `None` for responses without content.
    pub body: Option<JsonValue>,
}

impl ApiResponse {
    pub fn json(status: u16, body: JsonValue) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    pub fn ok(body: JsonValue) -> Self {
        Self::json(200, body)
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }
}
