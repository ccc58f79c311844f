//! Runtime observability events.
//!
//! Policy decisions, dead letters, and saga progress are published on the
//! shared event bus so operators and tests can observe them without
//! touching the hot path. Publishing is fire-and-forget.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use common::{EventBus, EventEnvelope, Topic};

use crate::policy::circuit_breaker::CircuitTransition;

/// Everything the runtime reports about itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RuntimeEvent {
    CircuitBreakerTransition {
        key: String,
        from: String,
        to: String,
        consecutive_failures: u32,
        at: DateTime<Utc>,
    },
    RetryAttempt {
        key: String,
        attempt: u32,
        delay_ms: u64,
        at: DateTime<Utc>,
    },
    RateLimitRejected {
        key: String,
        limit: usize,
        at: DateTime<Utc>,
    },
    DeadLetter {
        actor: String,
        handler: Option<String>,
        reason: String,
        at: DateTime<Utc>,
    },
    SagaStepCompleted {
        saga: String,
        instance: Uuid,
        step: String,
        at: DateTime<Utc>,
    },
    SagaStepCompensated {
        saga: String,
        instance: Uuid,
        step: String,
        error: Option<String>,
        at: DateTime<Utc>,
    },
}

/// Topics the runtime publishes on.
pub struct RuntimeTopics;

impl RuntimeTopics {
    pub const CIRCUIT_BREAKER: Topic = Topic("policy.circuit_breaker");
    pub const RETRY: Topic = Topic("policy.retry");
    pub const RATE_LIMIT: Topic = Topic("policy.rate_limit");
    pub const DEAD_LETTER: Topic = Topic("actor.dead_letter");
    pub const SAGA_STEP: Topic = Topic("saga.step");

    pub fn all() -> [Topic; 5] {
        [
            Self::CIRCUIT_BREAKER,
            Self::RETRY,
            Self::RATE_LIMIT,
            Self::DEAD_LETTER,
            Self::SAGA_STEP,
        ]
    }
}

/// Thin typed facade over the event bus.
#[derive(Clone)]
pub struct RuntimeEventPublisher {
    bus: Arc<EventBus<RuntimeEvent>>,
}

impl RuntimeEventPublisher {
    pub fn new(bus: Arc<EventBus<RuntimeEvent>>) -> Self {
        Self { bus }
    }

    pub async fn subscribe(&self, topic: Topic) -> broadcast::Receiver<EventEnvelope<RuntimeEvent>> {
        self.bus.subscribe(topic).await
    }

    pub async fn circuit_transition(&self, key: &str, transition: CircuitTransition) {
        self.bus
            .publish(
                RuntimeTopics::CIRCUIT_BREAKER,
                RuntimeEvent::CircuitBreakerTransition {
                    key: key.to_string(),
                    from: transition.from.to_string(),
                    to: transition.to.to_string(),
                    consecutive_failures: transition.consecutive_failures,
                    at: Utc::now(),
                },
            )
            .await;
    }

    pub async fn retry_attempt(&self, key: &str, attempt: u32, delay_ms: u64) {
        self.bus
            .publish(
                RuntimeTopics::RETRY,
                RuntimeEvent::RetryAttempt {
                    key: key.to_string(),
                    attempt,
                    delay_ms,
                    at: Utc::now(),
                },
            )
            .await;
    }

    pub async fn rate_limit_rejected(&self, key: &str, limit: usize) {
        self.bus
            .publish(
                RuntimeTopics::RATE_LIMIT,
                RuntimeEvent::RateLimitRejected {
                    key: key.to_string(),
                    limit,
                    at: Utc::now(),
                },
            )
            .await;
    }

    pub async fn dead_letter(&self, actor: &str, handler: Option<&str>, reason: &str) {
        self.bus
            .publish(
                RuntimeTopics::DEAD_LETTER,
                RuntimeEvent::DeadLetter {
                    actor: actor.to_string(),
                    handler: handler.map(str::to_string),
                    reason: reason.to_string(),
                    at: Utc::now(),
                },
            )
            .await;
    }

    pub async fn saga_step_completed(&self, saga: &str, instance: Uuid, step: &str) {
        self.bus
            .publish(
                RuntimeTopics::SAGA_STEP,
                RuntimeEvent::SagaStepCompleted {
                    saga: saga.to_string(),
                    instance,
                    step: step.to_string(),
                    at: Utc::now(),
                },
            )
            .await;
    }

    pub async fn saga_step_compensated(
        &self,
        saga: &str,
        instance: Uuid,
        step: &str,
        error: Option<&str>,
    ) {
        self.bus
            .publish(
                RuntimeTopics::SAGA_STEP,
                RuntimeEvent::SagaStepCompensated {
                    saga: saga.to_string(),
                    instance,
                    step: step.to_string(),
                    error: error.map(str::to_string),
                    at: Utc::now(),
                },
            )
            .await;
    }
}
