//! rulebase API - rule-checked record CRUD.
//!
//! [`RecordService`] runs the list, view, create, update and delete
//! operations of a collection: it applies the rate limits, checks the
//! collection's access rules, runs the operation's hook chain and
//! serializes the result into an [`ApiResponse`].

pub mod config;
pub mod error;
pub mod form;
pub mod hooks;
pub mod records;
pub mod service;
pub mod throttle;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResponse, ApiResult};
pub use form::{hash_password, verify_password, RecordUpsert};
pub use hooks::{Finalizer, FinalizerFn, Hook, Hooks, Next, RecordEvent, RecordsListEvent};
pub use records::{MSG_CREATE_FAILED, MSG_DELETE_FAILED, MSG_UPDATE_FAILED};
pub use service::RecordService;
