//! Policy resolution: combining definition-level and system-level bindings
//! into the effective policy for one `(definition, handler)` pair.
//!
//! Each policy kind resolves independently through four tiers, most
//! specific first:
//!
//! 1. a named binding on the actor definition (behaviors included, after
//!    the definition's own bindings);
//! 2. a wildcard binding on the actor definition;
//! 3. a system policy naming the handler exactly;
//! 4. a system policy whose glob pattern matches `"definition.handler"`.
//!
//! A kind left unfilled falls back to the default: one attempt, no
//! breaker, no timeout, no rate limit.

use crate::definition::{ActorDefinition, HandlerSelector};

use super::config::{
    glob_match, CircuitBreakerConfig, PolicyConfig, RateLimitConfig, RetryConfig, SystemPolicy,
    SystemSelector, TimeoutConfig,
};

/// A resolved rate limit together with the key of the shared limiter state
/// it draws from. Pattern-matched system policies share one window across
/// every pair the pattern covers; all other tiers get a per-pair window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSlot {
    pub config: RateLimitConfig,
    pub key: String,
}

/// Effective policy for one `(definition, handler)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    pub actor: String,
    pub handler: String,
    pub retry: RetryConfig,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub timeout: Option<TimeoutConfig>,
    pub rate_limit: Option<RateLimitSlot>,
}

impl ResolvedPolicy {
    /// Key identifying this pair in caches, breaker state, and events.
    pub fn key(&self) -> String {
        format!("{}.{}", self.actor, self.handler)
    }
}

pub fn resolve(
    definition: &ActorDefinition,
    handler: &str,
    system_policies: &[SystemPolicy],
) -> ResolvedPolicy {
    let pair_key = format!("{}.{}", definition.id, handler);

    let mut retry: Option<RetryConfig> = None;
    let mut circuit_breaker: Option<CircuitBreakerConfig> = None;
    let mut timeout: Option<TimeoutConfig> = None;
    let mut rate_limit: Option<RateLimitSlot> = None;

    let mut fill = |config: &PolicyConfig, limiter_key: &str| match config {
        PolicyConfig::Retry(c) => {
            if retry.is_none() {
                retry = Some(c.clone());
            }
        }
        PolicyConfig::CircuitBreaker(c) => {
            if circuit_breaker.is_none() {
                circuit_breaker = Some(c.clone());
            }
        }
        PolicyConfig::Timeout(c) => {
            if timeout.is_none() {
                timeout = Some(c.clone());
            }
        }
        PolicyConfig::RateLimit(c) => {
            if rate_limit.is_none() {
                rate_limit = Some(RateLimitSlot {
                    config: c.clone(),
                    key: limiter_key.to_string(),
                });
            }
        }
    };

    // Tier 1: named bindings on the definition (and its behaviors).
    for binding in definition.policy_bindings() {
        if matches!(&binding.selector, HandlerSelector::Named(name) if name == handler) {
            fill(&binding.config, &pair_key);
        }
    }
    // Tier 2: wildcard bindings on the definition.
    for binding in definition.policy_bindings() {
        if binding.selector == HandlerSelector::Any {
            fill(&binding.config, &pair_key);
        }
    }
    // Tier 3: system policies naming the handler.
    for policy in system_policies {
        if matches!(&policy.selector, SystemSelector::Handler(name) if name == handler) {
            fill(&policy.config, &pair_key);
        }
    }
    // Tier 4: pattern-matched system policies. The limiter key is the
    // pattern itself so every matching pair shares one window.
    for policy in system_policies {
        if let SystemSelector::Pattern(pattern) = &policy.selector {
            if glob_match(pattern, &pair_key) {
                fill(&policy.config, pattern);
            }
        }
    }

    ResolvedPolicy {
        actor: definition.id.clone(),
        handler: handler.to_string(),
        retry: retry.unwrap_or_default(),
        circuit_breaker,
        timeout,
        rate_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::HandlerSpec;
    use crate::policy::config::BackoffKind;
    use std::time::Duration;

    fn retry_policy(attempts: u32) -> PolicyConfig {
        PolicyConfig::Retry(RetryConfig {
            max_attempts: attempts,
            backoff: BackoffKind::None,
            initial_delay: Duration::ZERO,
        })
    }

    #[test]
    fn named_binding_beats_wildcard_and_system() {
        let def = ActorDefinition::new("payment")
            .with_handler(HandlerSpec::new("charge"))
            .with_policy(HandlerSelector::Named("charge".into()), retry_policy(5))
            .with_policy(HandlerSelector::Any, retry_policy(3));
        let system = vec![SystemPolicy::for_handler("charge", retry_policy(2))];
        let resolved = resolve(&def, "charge", &system);
        assert_eq!(resolved.retry.max_attempts, 5);
    }

    #[test]
    fn wildcard_beats_system_handler_policy() {
        let def = ActorDefinition::new("payment")
            .with_handler(HandlerSpec::new("charge"))
            .with_policy(HandlerSelector::Any, retry_policy(3));
        let system = vec![SystemPolicy::for_handler("charge", retry_policy(2))];
        assert_eq!(resolve(&def, "charge", &system).retry.max_attempts, 3);
    }

    #[test]
    fn system_handler_beats_pattern() {
        let def = ActorDefinition::new("payment").with_handler(HandlerSpec::new("charge"));
        let system = vec![
            SystemPolicy::for_pattern("payment.*", retry_policy(4)),
            SystemPolicy::for_handler("charge", retry_policy(2)),
        ];
        assert_eq!(resolve(&def, "charge", &system).retry.max_attempts, 2);
    }

    #[test]
    fn kinds_resolve_independently() {
        let def = ActorDefinition::new("payment")
            .with_handler(HandlerSpec::new("charge"))
            .with_policy(
                HandlerSelector::Named("charge".into()),
                PolicyConfig::Timeout(TimeoutConfig {
                    duration: Duration::from_millis(200),
                }),
            );
        let system = vec![SystemPolicy::for_pattern("payment.*", retry_policy(4))];
        let resolved = resolve(&def, "charge", &system);
        // Timeout from tier 1, retry from tier 4.
        assert_eq!(
            resolved.timeout.as_ref().map(|t| t.duration),
            Some(Duration::from_millis(200))
        );
        assert_eq!(resolved.retry.max_attempts, 4);
    }

    #[test]
    fn unmatched_handler_gets_defaults() {
        let def = ActorDefinition::new("payment").with_handler(HandlerSpec::new("charge"));
        let resolved = resolve(&def, "charge", &[]);
        assert_eq!(resolved.retry.max_attempts, 1);
        assert!(resolved.circuit_breaker.is_none());
        assert!(resolved.timeout.is_none());
        assert!(resolved.rate_limit.is_none());
    }

    #[test]
    fn pattern_rate_limit_shares_limiter_key() {
        let limit = PolicyConfig::RateLimit(RateLimitConfig {
            limit: 10,
            window: Duration::from_secs(1),
        });
        let def_a = ActorDefinition::new("payment").with_handler(HandlerSpec::new("charge"));
        let def_b = ActorDefinition::new("payment").with_handler(HandlerSpec::new("refund"));
        let system = vec![SystemPolicy::for_pattern("payment.*", limit)];
        let a = resolve(&def_a, "charge", &system);
        let b = resolve(&def_b, "refund", &system);
        assert_eq!(a.rate_limit.as_ref().map(|s| s.key.as_str()), Some("payment.*"));
        assert_eq!(
            a.rate_limit.map(|s| s.key),
            b.rate_limit.map(|s| s.key)
        );
    }
}
