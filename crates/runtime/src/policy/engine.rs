//! Policy engine: resolves effective policies and wraps invocations with
//! rate limiting, retries, circuit breaking, and timeouts.
//!
//! Composition order for one `execute` call:
//!
//! - the rate limiter gates the call once, before any attempt runs;
//! - the retry loop wraps everything else, so every attempt re-checks the
//!   circuit breaker;
//! - each attempt asks the breaker for permission, then runs the operation
//!   under the timeout, then reports the outcome back to the breaker.
//!
//! Circuit fast-fails are not recorded as breaker failures; only real
//! invocation outcomes move the failure count.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::definition::ActorDefinition;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::RuntimeEventPublisher;

use super::circuit_breaker::{CircuitBreaker, CircuitDecision, CircuitTransition};
use super::config::SystemPolicy;
use super::rate_limiter::RateLimiterWindow;
use super::resolve::{resolve, ResolvedPolicy};

pub struct PolicyEngine {
    system_policies: Vec<SystemPolicy>,
    resolved: DashMap<String, Arc<ResolvedPolicy>>,
    breakers: DashMap<String, Arc<Mutex<CircuitBreaker>>>,
    limiters: DashMap<String, Arc<Mutex<RateLimiterWindow>>>,
    events: RuntimeEventPublisher,
}

impl PolicyEngine {
    pub fn new(system_policies: Vec<SystemPolicy>, events: RuntimeEventPublisher) -> Self {
        Self {
            system_policies,
            resolved: DashMap::new(),
            breakers: DashMap::new(),
            limiters: DashMap::new(),
            events,
        }
    }

    /// Effective policy for `(definition, handler)`, resolved once and
    /// cached for the lifetime of the engine.
    pub fn resolve(&self, definition: &ActorDefinition, handler: &str) -> Arc<ResolvedPolicy> {
        let key = format!("{}.{}", definition.id, handler);
        if let Some(cached) = self.resolved.get(&key) {
            return Arc::clone(&cached);
        }
        let policy = Arc::new(resolve(definition, handler, &self.system_policies));
        self.resolved.insert(key, Arc::clone(&policy));
        policy
    }

    /// Run `operation` under `policy`. The operation is a factory so each
    /// retry attempt gets a fresh future.
    pub async fn execute<F, Fut>(
        &self,
        policy: &ResolvedPolicy,
        operation: F,
    ) -> RuntimeResult<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RuntimeResult<Value>>,
    {
        let key = policy.key();

        if let Some(slot) = &policy.rate_limit {
            let limiter = self.limiter(&slot.key, slot);
            let allowed = limiter.lock().try_acquire();
            if !allowed {
                warn!(key = %key, limiter = %slot.key, "rate limit exceeded");
                self.events
                    .rate_limit_rejected(&slot.key, slot.config.limit)
                    .await;
                return Err(RuntimeError::RateLimited {
                    key: slot.key.clone(),
                });
            }
        }

        let max_attempts = policy.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self.attempt(policy, &key, &operation).await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = policy.retry.delay_after(attempt);
                    debug!(
                        key = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.events
                        .retry_attempt(&key, attempt, delay.as_millis() as u64)
                        .await;
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt<F, Fut>(
        &self,
        policy: &ResolvedPolicy,
        key: &str,
        operation: &F,
    ) -> RuntimeResult<Value>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = RuntimeResult<Value>>,
    {
        let breaker = policy
            .circuit_breaker
            .as_ref()
            .map(|config| self.breaker(key, config));

        if let Some(breaker) = &breaker {
            let (decision, transition) = { breaker.lock().try_acquire() };
            self.publish_transition(key, transition).await;
            match decision {
                CircuitDecision::Allow | CircuitDecision::AllowProbe => {}
                CircuitDecision::Reject => {
                    debug!(key = %key, "circuit open, failing fast");
                    return Err(RuntimeError::CircuitOpen {
                        key: key.to_string(),
                    });
                }
            }
        }

        let result = match &policy.timeout {
            Some(timeout) => match tokio::time::timeout(timeout.duration, operation()).await {
                Ok(result) => result,
                Err(_) => Err(RuntimeError::Timeout {
                    timeout: timeout.duration,
                }),
            },
            None => operation().await,
        };

        if let Some(breaker) = &breaker {
            let transition = {
                let mut breaker = breaker.lock();
                match &result {
                    Ok(_) => breaker.record_success(),
                    Err(_) => breaker.record_failure(),
                }
            };
            self.publish_transition(key, transition).await;
        }

        result
    }

    fn breaker(
        &self,
        key: &str,
        config: &super::config::CircuitBreakerConfig,
    ) -> Arc<Mutex<CircuitBreaker>> {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CircuitBreaker::new(config.clone()))))
            .clone()
    }

    fn limiter(
        &self,
        key: &str,
        slot: &super::resolve::RateLimitSlot,
    ) -> Arc<Mutex<RateLimiterWindow>> {
        self.limiters
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateLimiterWindow::new(slot.config.clone()))))
            .clone()
    }

    async fn publish_transition(&self, key: &str, transition: Option<CircuitTransition>) {
        if let Some(transition) = transition {
            warn!(
                key = %key,
                from = %transition.from,
                to = %transition.to,
                failures = transition.consecutive_failures,
                "circuit breaker transition"
            );
            self.events.circuit_transition(key, transition).await;
        }
    }
}
