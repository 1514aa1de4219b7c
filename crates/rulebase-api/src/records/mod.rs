//! Record CRUD operations.
//!
//! Every operation follows the same sequence: resolve the collection, apply
//! the rate limit, check the rule slot, run the query or mutation inside the
//! operation's hook chain and serialize the result.

mod create;
mod delete;
mod list;
mod update;
mod view;

pub use create::MSG_CREATE_FAILED;
pub use delete::MSG_DELETE_FAILED;
pub use update::MSG_UPDATE_FAILED;

use crate::error::{ApiError, ApiResult};
use crate::service::RecordService;
use rulebase_core::catalog::{Collection, Rule};
use rulebase_core::query::{RecordFieldResolver, SelectQuery};
use rulebase_core::record::Record;
use rulebase_core::security::{apply_rule, RequestInfo};
use std::sync::Arc;
use tracing::debug;

impl RecordService {
    /// Fetch a record by id, narrowed by `rule` for non-superusers.
    ///
    /// Missing records, records filtered out by the rule and rules that fail
    /// to compile all yield the same not found error.
    pub(crate) fn find_with_rule(
        &self,
        collection: &Arc<Collection>,
        id: &str,
        rule: &Rule,
        request: &RequestInfo,
    ) -> ApiResult<Record> {
        if id.is_empty() {
            return Err(ApiError::not_found());
        }

        let mut resolver = RecordFieldResolver::new(&self.catalog, collection.clone(), request);
        let mut query = SelectQuery::records(collection);
        if let Err(err) = apply_rule(rule, &mut resolver, &mut query) {
            debug!(collection_id = %collection.id, error = %err, "rule rejected record lookup");
            return Err(ApiError::not_found());
        }

        self.store
            .find_record_by_id(collection, id, &query)
            .map_err(ApiError::from)
    }
}
