//! Access control: caller context, rule gate, hypothetical-record checks,
//! manage escalation and rate limiting.

mod context;
mod gate;
mod hypothetical;
mod manage;
mod rate_limit;

pub use context::{RequestInfo, DEFAULT_CONTEXT};
pub use gate::{apply_rule, authorize, ensure_not_locked, Access, ONLY_SUPERUSERS};
pub use hypothetical::{HypotheticalRecord, DUMMY_MARKER};
pub use manage::{has_manage_access, ManageTarget};
pub use rate_limit::{Audience, RateLimitRule, RateLimitSettings, RateLimiter};
