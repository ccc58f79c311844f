//! Policy configuration types and system-wide policy selectors.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How retry delays grow between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay for every retry.
    #[default]
    None,
    /// Delay grows linearly with the attempt number.
    Linear,
    /// Delay doubles with each attempt.
    Exponential,
}

/// Retry policy: total attempt budget and backoff between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one. 1 means no retries.
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Base delay, scaled by the backoff multiplier.
    #[serde(default, with = "duration_millis")]
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffKind::None,
            initial_delay: Duration::ZERO,
        }
    }
}

impl RetryConfig {
    /// Delay to sleep after the given failed attempt (1-based) before the
    /// next one runs.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let multiplier = match self.backoff {
            BackoffKind::None => 1,
            BackoffKind::Linear => attempt,
            BackoffKind::Exponential => 2u32.saturating_pow(attempt.saturating_sub(1)),
        };
        self.initial_delay.saturating_mul(multiplier)
    }
}

/// Circuit breaker policy: consecutive failures before opening and the
/// cool-down before a half-open probe is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    #[serde(with = "duration_millis")]
    pub reset_timeout: Duration,
}

/// Per-invocation deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

/// Sliding-window rate limit: at most `limit` acquisitions per `window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub limit: usize,
    #[serde(with = "duration_millis")]
    pub window: Duration,
}

/// One policy of any kind, as attached to a definition or the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    Retry(RetryConfig),
    CircuitBreaker(CircuitBreakerConfig),
    Timeout(TimeoutConfig),
    RateLimit(RateLimitConfig),
}

/// Which invocations a system-level policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemSelector {
    /// Any handler with this exact name, on any actor.
    Handler(String),
    /// Glob over `"definition.handler"` keys, e.g. `"payment.*"`.
    Pattern(String),
}

/// A system-wide policy: selector plus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPolicy {
    pub selector: SystemSelector,
    pub config: PolicyConfig,
}

impl SystemPolicy {
    pub fn for_handler(handler: impl Into<String>, config: PolicyConfig) -> Self {
        Self {
            selector: SystemSelector::Handler(handler.into()),
            config,
        }
    }

    pub fn for_pattern(pattern: impl Into<String>, config: PolicyConfig) -> Self {
        Self {
            selector: SystemSelector::Pattern(pattern.into()),
            config,
        }
    }
}

/// Simple `*`-glob match. A `*` matches any run of characters, including
/// the empty one. No escaping.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == input;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = input;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    // Pattern ended with `*` (or was all stars); whatever remains matches.
    true
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
