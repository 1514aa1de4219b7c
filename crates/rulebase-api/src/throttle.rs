//! Randomized response delay for filtered list requests.
//!
//! An empty result for a client filter on a rule-protected collection can
//! reveal, through response time, how the rule and the filter interact. The
//! delay narrows that side channel; it does not remove it.

use rand::rngs::OsRng;
use rand::Rng;
use rulebase_core::catalog::{Rule, RuleKind};
use std::time::Duration;
use tracing::debug;

/// Whether an empty filtered list response should be delayed.
///
/// Only non-superuser requests that carry a client filter against an
/// expression list rule and got no items qualify. `bucket` is consulted last,
/// so requests that do not qualify never consume it.
pub fn should_throttle_list(
    superuser: bool,
    rule: &Rule,
    filtered: bool,
    empty: bool,
    bucket: impl FnOnce() -> bool,
) -> bool {
    !superuser && filtered && matches!(rule.kind(), RuleKind::Expr(_)) && empty && bucket()
}

/// Pick a delay uniformly from `[0, soft_max)` using the OS random source.
pub fn pick_delay(soft_max: Duration) -> Duration {
    let max_millis = soft_max.as_millis() as u64;
    if max_millis == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(OsRng.gen_range(0..max_millis))
}

/// Sleep for a random delay below `soft_max` and return the delay.
pub fn random_delay(soft_max: Duration) -> Duration {
    let delay = pick_delay(soft_max);
    debug!(delay_ms = delay.as_millis() as u64, "throttling empty filtered list");
    std::thread::sleep(delay);
    delay
}
