use crate::error::{ApiResponse, ApiResult};
use crate::hooks::RecordsListEvent;
use crate::service::RecordService;
use crate::throttle;
use rulebase_core::catalog::{Collection, RuleAction};
use rulebase_core::query::{
    check_superuser_only_fields, RecordFieldResolver, SearchParams, SearchProvider, SelectQuery,
};
use rulebase_core::security::{apply_rule, ensure_not_locked, RequestInfo};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

impl RecordService {
    /// List the records of a collection visible to the caller.
    ///
    /// Reads `filter`, `sort`, `page`, `perPage` and `skipTotal` from the
    /// request query.
    pub fn list(&self, collection: &str, request: RequestInfo) -> ApiResult<ApiResponse> {
        let collection = self.find_collection(collection)?;
        self.list_records(&collection, request)
            .map_err(|err| self.log_failure(&collection, RuleAction::List, err))
    }

    fn list_records(&self, collection: &Arc<Collection>, request: RequestInfo) -> ApiResult<ApiResponse> {
        self.check_rate_limit(collection, RuleAction::List, &request)?;

        let rule = collection.rule(RuleAction::List);
        ensure_not_locked(rule, &request)?;

        let params = SearchParams::from_query(
            &request.query,
            self.config.default_per_page,
            self.config.max_per_page,
        )?;
        if !request.superuser {
            check_superuser_only_fields(params.filter.as_deref(), params.sort.as_deref())?;
        }
        let filtered = params.filter.is_some();

        let request = Arc::new(request);
        let mut resolver = RecordFieldResolver::new(&self.catalog, collection.clone(), &request);
        let mut query = SelectQuery::records(collection);
        apply_rule(rule, &mut resolver, &mut query)?;
        let result = SearchProvider::new(&mut resolver, query)
            .with_params(params)
            .exec(&self.store)?;

        // an empty filtered result may otherwise leak rule details through timing
        let throttled = throttle::should_throttle_list(
            request.superuser,
            rule,
            filtered,
            result.items.is_empty(),
            || self.timing_limiter.allow(&collection.id, &self.config.list_timing_rule),
        );
        if throttled {
            throttle::random_delay(self.config.throttle_soft_max);
        }

        let mut event = RecordsListEvent {
            collection: collection.clone(),
            result,
            request: request.clone(),
            response: None,
        };
        self.hooks.on_records_list_request.trigger(&mut event, |e| {
            let items: Vec<JsonValue> = e
                .result
                .items
                .iter()
                .map(|record| self.enrich(record, &e.request))
                .collect();
            e.response = Some(ApiResponse::ok(json!({
                "page": e.result.page,
                "perPage": e.result.per_page,
                "totalItems": e.result.total_items,
                "totalPages": e.result.total_pages,
                "items": items,
            })));
            Ok(())
        })?;

        Ok(event.response.unwrap_or_else(ApiResponse::no_content))
    }
}
