use crate::error::{ApiResponse, ApiResult};
use crate::hooks::RecordEvent;
use crate::service::RecordService;
use rulebase_core::catalog::{Collection, RuleAction};
use rulebase_core::security::{ensure_not_locked, RequestInfo};
use std::sync::Arc;

impl RecordService {
    /// Fetch a single record. Missing and forbidden records are both 404.
    pub fn view(&self, collection: &str, id: &str, request: RequestInfo) -> ApiResult<ApiResponse> {
        let collection = self.find_collection(collection)?;
        self.view_record(&collection, id, request)
            .map_err(|err| self.log_failure(&collection, RuleAction::View, err))
    }

    fn view_record(
        &self,
        collection: &Arc<Collection>,
        id: &str,
        request: RequestInfo,
    ) -> ApiResult<ApiResponse> {
        self.check_rate_limit(collection, RuleAction::View, &request)?;

        let rule = collection.rule(RuleAction::View);
        ensure_not_locked(rule, &request)?;

        let request = Arc::new(request);
        let record = self.find_with_rule(collection, id, rule, &request)?;

        let mut event = RecordEvent::new(collection.clone(), record, request);
        self.hooks.on_record_view_request.trigger(&mut event, |e| {
            e.response = Some(ApiResponse::ok(self.enrich(&e.record, &e.request)));
            Ok(())
        })?;

        Ok(event.response.unwrap_or_else(ApiResponse::no_content))
    }
}
