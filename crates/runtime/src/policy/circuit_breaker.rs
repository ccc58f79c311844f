//! Circuit breaker state machine.
//!
//! Closed counts consecutive failures and opens at the configured threshold.
//! Open rejects every acquisition until the reset timeout elapses, then
//! moves to half-open and lets exactly one probe through. The probe's
//! outcome decides: success closes the breaker, failure re-opens it with a
//! fresh cool-down. Uses `tokio::time::Instant` so paused-clock tests can
//! drive the cool-down.

use std::fmt;
use tokio::time::Instant;

use super::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        };
        write!(f, "{name}")
    }
}

/// A state change, reported to the caller for event emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub consecutive_failures: u32,
}

/// Outcome of asking the breaker for permission to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Closed, invoke normally.
    Allow,
    /// Half-open, this call is the single probe.
    AllowProbe,
    /// Open (or a probe is already in flight), fail fast.
    Reject,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Ask permission to invoke. May transition Open -> HalfOpen when the
    /// cool-down has elapsed; the transition, if any, is returned so the
    /// caller can publish it.
    pub fn try_acquire(&mut self) -> (CircuitDecision, Option<CircuitTransition>) {
        match self.state {
            CircuitState::Closed => (CircuitDecision::Allow, None),
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.reset_timeout)
                    .unwrap_or(true);
                if elapsed {
                    let transition = self.transition(CircuitState::HalfOpen);
                    self.probe_in_flight = true;
                    (CircuitDecision::AllowProbe, Some(transition))
                } else {
                    (CircuitDecision::Reject, None)
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_in_flight {
                    (CircuitDecision::Reject, None)
                } else {
                    self.probe_in_flight = true;
                    (CircuitDecision::AllowProbe, None)
                }
            }
        }
    }

    /// Record a successful invocation.
    pub fn record_success(&mut self) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.consecutive_failures = 0;
                self.opened_at = None;
                Some(self.transition(CircuitState::Closed))
            }
            // A success cannot be observed while open: nothing was allowed
            // through. Tolerate it anyway.
            CircuitState::Open => None,
        }
    }

    /// Record a failed invocation.
    pub fn record_failure(&mut self) -> Option<CircuitTransition> {
        match self.state {
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.opened_at = Some(Instant::now());
                    Some(self.transition(CircuitState::Open))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                self.probe_in_flight = false;
                self.consecutive_failures += 1;
                self.opened_at = Some(Instant::now());
                Some(self.transition(CircuitState::Open))
            }
            CircuitState::Open => None,
        }
    }

    fn transition(&mut self, to: CircuitState) -> CircuitTransition {
        let from = self.state;
        self.state = to;
        CircuitTransition {
            from,
            to,
            consecutive_failures: self.consecutive_failures,
        }
    }
}
