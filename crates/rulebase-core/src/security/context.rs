//! Per-request caller context.
//!
//! The request info carries the caller identity and the raw request payload
//! that rules can reference through `@request.*`.

use crate::record::Record;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Default value of `@request.context`.
pub const DEFAULT_CONTEXT: &str = "default";

/// Request-scoped caller context. Immutable once the request is authorized.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Authenticated record, if any.
    pub auth: Option<Record>,
    /// Superusers bypass every rule.
    pub superuser: bool,
    /// HTTP method.
    pub method: String,
    /// Request origin (`default`, `realtime`, `protectedFile`...).
    pub context: String,
    /// Headers, keyed by normalized name (lowercase, `-` replaced by `_`).
    pub headers: BTreeMap<String, String>,
    /// Query string parameters.
    pub query: BTreeMap<String, String>,
    /// Submitted body fields.
    pub body: Map<String, JsonValue>,
    /// Client address used as the rate limit key.
    pub remote_ip: String,
}

impl Default for RequestInfo {
    fn default() -> Self {
        Self {
            auth: None,
            superuser: false,
            method: "GET".to_string(),
            context: DEFAULT_CONTEXT.to_string(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            body: Map::new(),
            remote_ip: "127.0.0.1".to_string(),
        }
    }
}

impl RequestInfo {
    /// An unauthenticated caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A superuser caller.
    pub fn superuser() -> Self {
        Self {
            superuser: true,
            ..Self::default()
        }
    }

    /// A caller authenticated as `record`.
    pub fn authenticated(record: Record) -> Self {
        Self {
            auth: Some(record),
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(normalize_header(name), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Map<String, JsonValue>) -> Self {
        self.body = body;
        self
    }

    pub fn with_remote_ip(mut self, ip: impl Into<String>) -> Self {
        self.remote_ip = ip.into();
        self
    }

    /// Header value by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&normalize_header(name)).map(String::as_str)
    }

    /// Id of the authenticated record, empty for guests.
    pub fn auth_id(&self) -> &str {
        self.auth.as_ref().map(Record::id).unwrap_or_default()
    }

    pub fn is_guest(&self) -> bool {
        self.auth.is_none() && !self.superuser
    }
}

fn normalize_header(name: &str) -> String {
    name.to_ascii_lowercase().replace('-', "_")
}
