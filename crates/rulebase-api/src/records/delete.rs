use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::hooks::{FinalizerFn, RecordEvent};
use crate::service::RecordService;
use rulebase_core::catalog::{Collection, RuleAction};
use rulebase_core::security::{ensure_not_locked, RequestInfo};
use std::sync::Arc;

/// Reported when the delete statement fails.
pub const MSG_DELETE_FAILED: &str = "Failed to delete record.";

impl RecordService {
    /// Delete a record. Responds with 204 on success.
    pub fn delete(
        &self,
        collection: &str,
        id: &str,
        request: RequestInfo,
        finalizer: Option<FinalizerFn>,
    ) -> ApiResult<ApiResponse> {
        let collection = self.find_collection(collection)?;
        self.delete_record(&collection, id, request, finalizer)
            .map_err(|err| self.log_failure(&collection, RuleAction::Delete, err))
    }

    fn delete_record(
        &self,
        collection: &Arc<Collection>,
        id: &str,
        request: RequestInfo,
        finalizer: Option<FinalizerFn>,
    ) -> ApiResult<ApiResponse> {
        self.check_rate_limit(collection, RuleAction::Delete, &request)?;

        let rule = collection.rule(RuleAction::Delete);
        ensure_not_locked(rule, &request)?;

        let request = Arc::new(request);
        let record = self.find_with_rule(collection, id, rule, &request)?;

        let mut event = RecordEvent::new(collection.clone(), record, request);
        self.hooks.on_record_delete_request.trigger_finalized(&mut event, finalizer, |e| {
            self.store
                .delete(&e.record)
                .map_err(|err| ApiError::bad_request(MSG_DELETE_FAILED).with_detail(err))?;
            e.response = Some(ApiResponse::no_content());
            Ok(())
        })?;

        Ok(event.response.unwrap_or_else(ApiResponse::no_content))
    }
}
