use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::form::RecordUpsert;
use crate::hooks::{FinalizerFn, RecordEvent};
use crate::service::RecordService;
use rulebase_core::catalog::{Collection, RuleAction, RuleKind};
use rulebase_core::record::Record;
use rulebase_core::security::{
    ensure_not_locked, has_manage_access, HypotheticalRecord, ManageTarget, RequestInfo,
};
use std::sync::Arc;
use tracing::debug;

/// Reported for every failed create rule check, whatever the cause.
pub const MSG_CREATE_FAILED: &str = "Failed to create record.";

impl RecordService {
    /// Create a record from the request body.
    ///
    /// The create rule is evaluated against the submitted data before
    /// anything is written. `finalizer` runs exactly once after a successful
    /// write, even when a hook handler stops the chain.
    pub fn create(
        &self,
        collection: &str,
        request: RequestInfo,
        finalizer: Option<FinalizerFn>,
    ) -> ApiResult<ApiResponse> {
        let collection = self.find_collection(collection)?;
        self.create_record(&collection, request, finalizer)
            .map_err(|err| self.log_failure(&collection, RuleAction::Create, err))
    }

    fn create_record(
        &self,
        collection: &Arc<Collection>,
        request: RequestInfo,
        finalizer: Option<FinalizerFn>,
    ) -> ApiResult<ApiResponse> {
        self.check_rate_limit(collection, RuleAction::Create, &request)?;

        let rule = collection.rule(RuleAction::Create);
        ensure_not_locked(rule, &request)?;

        let mut record = Record::new(collection.clone());
        let data = self.data_from_request(&record, &request);
        let mut request = request;
        request.body = data.clone();
        let request = Arc::new(request);

        let mut form = RecordUpsert::for_create();
        if request.superuser {
            form.grant_superuser_access();
        }
        form.load(&mut record, data);

        if !request.superuser {
            let dummy = HypotheticalRecord::new(&record);

            if let RuleKind::Expr(expr) = rule.kind() {
                match dummy.check(&self.store, &self.catalog, &request, expr) {
                    Ok(true) => {}
                    Ok(false) => return Err(ApiError::bad_request(MSG_CREATE_FAILED)),
                    Err(err) => {
                        debug!(collection_id = %collection.id, error = %err, "create rule check failed");
                        return Err(ApiError::bad_request(MSG_CREATE_FAILED).with_detail(err));
                    }
                }
            }

            if has_manage_access(
                &self.store,
                &self.catalog,
                &request,
                collection,
                ManageTarget::Hypothetical(&dummy),
            ) {
                form.grant_manager_access();
            }
        }

        let mut event = RecordEvent::new(collection.clone(), record, request);
        self.hooks.on_record_create_request.trigger_finalized(&mut event, finalizer, |e| {
            form.submit(&self.store, &mut e.record).map_err(|err| match err {
                ApiError::Internal(cause) => ApiError::bad_request(MSG_CREATE_FAILED).with_detail(cause),
                other => other,
            })?;
            e.response = Some(ApiResponse::ok(self.enrich(&e.record, &e.request)));
            Ok(())
        })?;

        Ok(event.response.unwrap_or_else(ApiResponse::no_content))
    }
}
