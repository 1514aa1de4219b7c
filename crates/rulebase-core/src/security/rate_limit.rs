//! Fixed-window request rate limiting.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Which callers a rate limit rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    All,
    /// Unauthenticated callers only.
    Guest,
    /// Authenticated callers only.
    Auth,
}

impl Audience {
    fn matches(&self, guest: bool) -> bool {
        match self {
            Audience::All => true,
            Audience::Guest => guest,
            Audience::Auth => !guest,
        }
    }
}

/// A single rate limit rule.
///
/// Labels are either `collection:action`, `*:action` or a bare collection
/// name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    pub label: String,
    pub max_requests: u32,
    /// Window length in seconds.
    #[serde(rename = "duration")]
    pub duration_secs: u64,
    #[serde(default)]
    pub audience: Audience,
}

impl RateLimitRule {
    pub fn new(label: impl Into<String>, max_requests: u32, duration_secs: u64) -> Self {
        Self {
            label: label.into(),
            max_requests,
            duration_secs,
            audience: Audience::All,
        }
    }

    pub fn with_audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Rate limit configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub rules: Vec<RateLimitRule>,
}

impl RateLimitSettings {
    /// Most specific rule for the collection action:
    /// `name:action`, then `*:action`, then `name`.
    pub fn find_rule(&self, collection: &str, action: &str, guest: bool) -> Option<&RateLimitRule> {
        let candidates = [
            format!("{}:{}", collection, action),
            format!("*:{}", action),
            collection.to_string(),
        ];
        candidates.iter().find_map(|label| {
            self.rules
                .iter()
                .find(|r| &r.label == label && r.audience.matches(guest))
        })
    }
}

/// Expired windows are swept at most this often.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    expires: Instant,
    count: u32,
}

impl Window {
    fn open(now: Instant, rule: &RateLimitRule) -> Self {
        Self {
            expires: now + rule.duration(),
            count: 0,
        }
    }
}

/// Counts requests per key in fixed windows.
///
/// Keys combine the rule label with the client address, so each rule keeps
/// independent counters. Expired windows are dropped by a periodic sweep
/// run from [`RateLimiter::allow`].
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
    last_sweep: Mutex<Instant>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self {
            windows: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request for `key` and report whether it is within `rule`.
    pub fn allow(&self, key: &str, rule: &RateLimitRule) -> bool {
        self.allow_at(key, rule, Instant::now())
    }

    fn allow_at(&self, key: &str, rule: &RateLimitRule, now: Instant) -> bool {
        self.sweep_at(now);

        let window_key = format!("{}@{}", rule.label, key);
        let mut entry = self
            .windows
            .entry(window_key)
            .or_insert_with(|| Window::open(now, rule));
        if now >= entry.expires {
            *entry = Window::open(now, rule);
        }
        if entry.count >= rule.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop expired windows if the last sweep is older than [`SWEEP_INTERVAL`].
    fn sweep_at(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock();
            if now.saturating_duration_since(*last) < SWEEP_INTERVAL {
                return;
            }
            *last = now;
        }
        self.prune_at(now);
    }

    /// Drop all expired windows.
    pub fn prune(&self) {
        self.prune_at(Instant::now());
    }

    fn prune_at(&self, now: Instant) {
        self.windows.retain(|_, window| window.expires > now);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_rule_precedence() {
        let settings = RateLimitSettings {
            enabled: true,
            rules: vec![
                RateLimitRule::new("posts", 100, 60),
                RateLimitRule::new("*:list", 50, 60),
                RateLimitRule::new("posts:list", 10, 60),
                RateLimitRule::new("posts:create", 5, 60).with_audience(Audience::Guest),
            ],
        };

        assert_eq!(settings.find_rule("posts", "list", true).unwrap().max_requests, 10);
        assert_eq!(settings.find_rule("users", "list", true).unwrap().max_requests, 50);
        assert_eq!(settings.find_rule("posts", "view", true).unwrap().max_requests, 100);
        assert_eq!(settings.find_rule("posts", "create", true).unwrap().max_requests, 5);
        assert_eq!(settings.find_rule("posts", "create", false).unwrap().max_requests, 100);
        assert!(settings.find_rule("users", "view", false).is_none());
    }

    #[test]
    fn test_fixed_window() {
        let limiter = RateLimiter::new();
        let rule = RateLimitRule::new("posts:list", 2, 10);
        let start = Instant::now();

        assert!(limiter.allow_at("1.1.1.1", &rule, start));
        assert!(limiter.allow_at("1.1.1.1", &rule, start));
        assert!(!limiter.allow_at("1.1.1.1", &rule, start));
        // other clients are counted separately
        assert!(limiter.allow_at("2.2.2.2", &rule, start));
        // a new window resets the counter
        assert!(limiter.allow_at("1.1.1.1", &rule, start + Duration::from_secs(10)));
    }

    #[test]
    fn test_prune() {
        let limiter = RateLimiter::new();
        limiter.allow("a", &RateLimitRule::new("x", 1, 0));
        limiter.allow("b", &RateLimitRule::new("y", 1, 60));
        assert_eq!(limiter.len(), 2);
        limiter.prune();
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn test_allow_sweeps_expired_windows() {
        let limiter = RateLimiter::new();
        let short = RateLimitRule::new("posts:list", 1, 1);
        let long = RateLimitRule::new("posts:create", 1, 600);
        let start = Instant::now();

        for ip in ["1.1.1.1", "2.2.2.2", "3.3.3.3"] {
            assert!(limiter.allow_at(ip, &short, start));
        }
        assert!(limiter.allow_at("1.1.1.1", &long, start));
        assert_eq!(limiter.len(), 4);

        // before the sweep interval nothing is dropped
        assert!(limiter.allow_at("4.4.4.4", &short, start + Duration::from_secs(2)));
        assert_eq!(limiter.len(), 5);

        let later = start + SWEEP_INTERVAL + Duration::from_secs(1);
        assert!(limiter.allow_at("5.5.5.5", &short, later));
        assert_eq!(limiter.len(), 2);
        // the long window survived and still counts
        assert!(!limiter.allow_at("1.1.1.1", &long, later));
    }

    #[test]
    fn test_settings_from_json() {
        let settings: RateLimitSettings = serde_json::from_str(
            r#"{"enabled": true, "rules": [{"label": "*:create", "maxRequests": 3, "duration": 5, "audience": "guest"}]}"#,
        )
        .unwrap();
        assert_eq!(settings.rules[0].duration(), Duration::from_secs(5));
        assert_eq!(settings.rules[0].audience, Audience::Guest);
    }
}
