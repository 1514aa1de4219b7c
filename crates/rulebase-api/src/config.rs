//! API configuration.

use rulebase_core::query::{DEFAULT_PER_PAGE, MAX_PER_PAGE};
use rulebase_core::security::{RateLimitRule, RateLimitSettings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default upper bound of the list timing mitigation delay.
pub const DEFAULT_THROTTLE_SOFT_MAX: Duration = Duration::from_millis(150);

/// Label of the bucket guarding the list timing mitigation.
pub const LIST_TIMING_LABEL: &str = "@list_timing";

/// Record API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApiConfig {
    /// Append raw error causes to error messages.
    pub dev_mode: bool,

    /// Page size when the request does not specify one.
    pub default_per_page: usize,

    /// Upper bound for the requested page size.
    pub max_per_page: usize,

    /// Exclusive upper bound of the randomized list delay.
    #[serde(with = "millis")]
    pub throttle_soft_max: Duration,

    /// Per-collection bucket that bounds how often the list delay is applied.
    pub list_timing_rule: RateLimitRule,

    /// Per-collection request rate limits.
    pub rate_limits: RateLimitSettings,
}

impl ApiConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self {
            dev_mode: false,
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: MAX_PER_PAGE,
            throttle_soft_max: DEFAULT_THROTTLE_SOFT_MAX,
            list_timing_rule: RateLimitRule::new(LIST_TIMING_LABEL, 3, 3),
            rate_limits: RateLimitSettings::default(),
        }
    }

    /// Parse a configuration from JSON; missing keys keep their defaults.
    ///
    /// Page sizes are normalized the same way as [`ApiConfig::with_page_sizes`].
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        let (default, max) = (config.default_per_page, config.max_per_page);
        Ok(config.with_page_sizes(default, max))
    }

    /// Enable or disable detailed error messages.
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Set the default and maximum page sizes.
    pub fn with_page_sizes(mut self, default: usize, max: usize) -> Self {
        self.max_per_page = max.max(1);
        self.default_per_page = default.clamp(1, self.max_per_page);
        self
    }

    /// Set the upper bound of the list delay.
    pub fn with_throttle_soft_max(mut self, soft_max: Duration) -> Self {
        self.throttle_soft_max = soft_max;
        self
    }

    /// Set the list timing bucket.
    pub fn with_list_timing_rule(mut self, max_requests: u32, duration_secs: u64) -> Self {
        self.list_timing_rule = RateLimitRule::new(LIST_TIMING_LABEL, max_requests, duration_secs);
        self
    }

    /// Set the rate limit settings.
    pub fn with_rate_limits(mut self, settings: RateLimitSettings) -> Self {
        self.rate_limits = settings;
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
