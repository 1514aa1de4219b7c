//! Record service: shared state and helpers of the record operations.

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::hooks::Hooks;
use rulebase_core::catalog::{Catalog, Collection, FieldKind, RuleAction};
use rulebase_core::record::Record;
use rulebase_core::security::{RateLimiter, RequestInfo};
use rulebase_core::store::Store;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, warn};

/// Message for requests naming an unknown collection.
pub const MSG_MISSING_COLLECTION: &str = "Missing collection context.";

/// Entry point of the record CRUD operations.
///
/// Holds the catalog, the store, the hooks and the process-wide rate limit
/// buckets. Every operation builds its resolver and queries fresh.
pub struct RecordService {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) store: Store,
    pub(crate) config: ApiConfig,
    pub(crate) hooks: Hooks,
    pub(crate) limiter: RateLimiter,
    pub(crate) timing_limiter: RateLimiter,
}

impl std::fmt::Debug for RecordService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordService")
            .field("collections", &self.catalog.len())
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

impl RecordService {
    pub fn new(catalog: Arc<Catalog>, store: Store, config: ApiConfig) -> Self {
        Self {
            catalog,
            store,
            config,
            hooks: Hooks::new(),
            limiter: RateLimiter::new(),
            timing_limiter: RateLimiter::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Hook registry; handlers may be bound at any time.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Look up a collection by id or name.
    pub fn find_collection(&self, name_or_id: &str) -> ApiResult<Arc<Collection>> {
        self.catalog
            .find(name_or_id)
            .ok_or_else(|| ApiError::NotFound(MSG_MISSING_COLLECTION.to_string()))
    }

    /// Count the request against the matching rate limit rule.
    ///
    /// Superusers are exempt.
    pub fn check_rate_limit(
        &self,
        collection: &Collection,
        action: RuleAction,
        request: &RequestInfo,
    ) -> ApiResult<()> {
        let settings = &self.config.rate_limits;
        if !settings.enabled || request.superuser {
            return Ok(());
        }
        let Some(rule) = settings.find_rule(&collection.name, action.as_str(), request.is_guest())
        else {
            return Ok(());
        };
        if !self.limiter.allow(&request.remote_ip, rule) {
            warn!(
                collection_id = %collection.id,
                action = action.as_str(),
                ip = %request.remote_ip,
                "rate limit exceeded"
            );
            return Err(ApiError::TooManyRequests);
        }
        Ok(())
    }

    /// Submitted body with field modifiers resolved against `record` and,
    /// for non-superusers, hidden fields removed (the auth password is kept).
    pub fn data_from_request(&self, record: &Record, request: &RequestInfo) -> Map<String, JsonValue> {
        let mut data = record.replace_modifiers(request.body.clone());
        if !request.superuser {
            for field in &record.collection().fields {
                if field.hidden && !matches!(field.kind, FieldKind::Password) {
                    data.remove(&field.name);
                }
            }
        }
        data
    }

    /// Serialize a record for `request`.
    ///
    /// Hidden fields are only visible to superusers. The auth email is
    /// visible to superusers, to the record owner and when `emailVisibility`
    /// is set.
    pub fn enrich(&self, record: &Record, request: &RequestInfo) -> JsonValue {
        let mut data = record.export(request.superuser);
        if record.collection().is_auth()
            && !request.superuser
            && !record.get_bool("emailVisibility")
            && request.auth_id() != record.id()
        {
            data.remove("email");
        }
        JsonValue::Object(data)
    }

    /// Log failures that are not the caller's fault and pass the error on.
    pub(crate) fn log_failure(&self, collection: &Collection, action: RuleAction, err: ApiError) -> ApiError {
        match &err {
            ApiError::Internal(cause) => {
                error!(
                    collection_id = %collection.id,
                    action = action.as_str(),
                    error = %cause,
                    "record request failed"
                );
            }
            ApiError::Forbidden(_) => {
                warn!(collection_id = %collection.id, action = action.as_str(), "access denied");
            }
            _ => {}
        }
        err
    }
}
