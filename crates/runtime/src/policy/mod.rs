//! Declarative reliability policies and their enforcement.

pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod rate_limiter;
pub mod resolve;

pub use circuit_breaker::{CircuitBreaker, CircuitDecision, CircuitState, CircuitTransition};
pub use config::{
    BackoffKind, CircuitBreakerConfig, PolicyConfig, RateLimitConfig, RetryConfig, SystemPolicy,
    SystemSelector, TimeoutConfig,
};
pub use engine::PolicyEngine;
pub use resolve::{RateLimitSlot, ResolvedPolicy};
