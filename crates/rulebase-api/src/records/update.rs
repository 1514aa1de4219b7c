use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::form::RecordUpsert;
use crate::hooks::{FinalizerFn, RecordEvent};
use crate::service::RecordService;
use rulebase_core::catalog::{Collection, RuleAction};
use rulebase_core::query::SelectQuery;
use rulebase_core::security::{ensure_not_locked, has_manage_access, ManageTarget, RequestInfo};
use std::sync::Arc;

/// Reported when persisting an update fails.
pub const MSG_UPDATE_FAILED: &str = "Failed to update record.";

impl RecordService {
    /// Update a record with the request body.
    ///
    /// Field modifiers in the body are resolved against the stored record
    /// before the update rule runs, so the rule sees the final values in
    /// `@request.body`.
    pub fn update(
        &self,
        collection: &str,
        id: &str,
        request: RequestInfo,
        finalizer: Option<FinalizerFn>,
    ) -> ApiResult<ApiResponse> {
        let collection = self.find_collection(collection)?;
        self.update_record(&collection, id, request, finalizer)
            .map_err(|err| self.log_failure(&collection, RuleAction::Update, err))
    }

    fn update_record(
        &self,
        collection: &Arc<Collection>,
        id: &str,
        request: RequestInfo,
        finalizer: Option<FinalizerFn>,
    ) -> ApiResult<ApiResponse> {
        self.check_rate_limit(collection, RuleAction::Update, &request)?;

        let rule = collection.rule(RuleAction::Update);
        ensure_not_locked(rule, &request)?;
        if id.is_empty() {
            return Err(ApiError::not_found());
        }

        let stored = self
            .store
            .find_record_by_id(collection, id, &SelectQuery::records(collection))?;
        let data = self.data_from_request(&stored, &request);
        let mut request = request;
        request.body = data.clone();
        let request = Arc::new(request);

        let record = self.find_with_rule(collection, id, rule, &request)?;

        let mut form = RecordUpsert::for_update(record.clone());
        if request.superuser {
            form.grant_superuser_access();
        } else if has_manage_access(
            &self.store,
            &self.catalog,
            &request,
            collection,
            ManageTarget::Existing(&record),
        ) {
            form.grant_manager_access();
        }

        let mut updated = record;
        form.load(&mut updated, data);

        let mut event = RecordEvent::new(collection.clone(), updated, request);
        self.hooks.on_record_update_request.trigger_finalized(&mut event, finalizer, |e| {
            form.submit(&self.store, &mut e.record).map_err(|err| match err {
                ApiError::Internal(cause) => ApiError::bad_request(MSG_UPDATE_FAILED).with_detail(cause),
                other => other,
            })?;
            e.response = Some(ApiResponse::ok(self.enrich(&e.record, &e.request)));
            Ok(())
        })?;

        Ok(event.response.unwrap_or_else(ApiResponse::no_content))
    }
}
