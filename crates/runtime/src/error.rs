//! Runtime error taxonomy.
//!
//! Four classes of failure flow through the runtime:
//!
//! - validation: bad input, unknown handler, missing implementation;
//!   surfaced immediately, never retried;
//! - policy rejection: circuit open or rate limited; failed fast without
//!   invoking the underlying operation;
//! - handler failure: an error raised by user handler logic (including
//!   timeouts), subject to retry policy before it is surfaced;
//! - lifecycle: sends to stopped or unknown actors; always dead letters,
//!   never retried.

use std::time::Duration;
use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown handler '{handler}' on actor definition '{actor}'")]
    UnknownHandler { actor: String, handler: String },

    #[error("handler '{handler}' not implemented for actor '{actor}'")]
    HandlerNotImplemented { actor: String, handler: String },

    #[error("unknown actor definition '{0}'")]
    UnknownDefinition(String),

    #[error("actor capacity exceeded ({0} instances)")]
    CapacityExceeded(usize),

    #[error("circuit open for '{key}'")]
    CircuitOpen { key: String },

    #[error("rate limit exceeded for '{key}'")]
    RateLimited { key: String },

    #[error("operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("cannot send to stopped actor '{0}'")]
    ActorStopped(String),

    #[error("unknown actor '{0}'")]
    UnknownActor(String),
}

impl RuntimeError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Fast-fail produced by a policy guard, before the operation ran.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. } | Self::RateLimited { .. })
    }

    /// Whether an enclosing retry policy may re-attempt after this error.
    ///
    /// Handler failures and timeouts retry. A circuit-open fast-fail is
    /// retryable too: every retry attempt re-checks the breaker, so a
    /// cool-down elapsing mid-loop lets a later attempt through. Validation
    /// and lifecycle errors never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Handler(_) | Self::Timeout { .. } | Self::CircuitOpen { .. }
        )
    }
}
