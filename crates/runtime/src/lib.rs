//! Reactive actor runtime: serialized mailboxes, declarative reliability
//! policies, and saga orchestration over JSON messages.
//!
//! The pieces fit together like this:
//!
//! - [`definition`] holds declarative [`ActorDefinition`]s and the
//!   registries mapping them to handler implementations;
//! - [`policy`] resolves retry, circuit breaker, timeout, and rate limit
//!   configuration per `(definition, handler)` pair and enforces it around
//!   every invocation;
//! - [`actors`] gives each spawned instance a FIFO mailbox drained by one
//!   worker task, with `tell`/`ask` semantics and restart support;
//! - [`system`] owns the instances, routes messages by id, counts metrics,
//!   and shuts everything down;
//! - [`saga`] sequences multi-actor workflows with data mapping and
//!   backward or forward compensation;
//! - [`events`] publishes policy decisions, dead letters, and saga progress
//!   on a broadcast bus.

pub mod actors;
pub mod config;
pub mod definition;
pub mod error;
pub mod events;
pub mod policy;
pub mod saga;
pub mod system;

pub use actors::handler::{handler_fn, HandlerMap, MessageHandler};
pub use actors::{ActorId, ActorRef, ActorStatus, SendMode};
pub use config::RuntimeConfig;
pub use definition::{
    ActorDefinition, DefinitionRegistry, HandlerSelector, HandlerSpec, ImplementationRegistry,
    InMemoryRegistry, PolicyBinding,
};
pub use error::{RuntimeError, RuntimeResult};
pub use events::{RuntimeEvent, RuntimeEventPublisher, RuntimeTopics};
pub use policy::{
    BackoffKind, CircuitBreakerConfig, CircuitState, PolicyConfig, PolicyEngine, RateLimitConfig,
    ResolvedPolicy, RetryConfig, SystemPolicy, SystemSelector, TimeoutConfig,
};
pub use saga::{
    CompensationStrategy, CompensationTarget, SagaDefinition, SagaInstance, SagaOrchestrator,
    SagaStatus, SagaStepDef, StepRecord, StepRecordKind,
};
pub use system::{ActorSystem, MetricsSnapshot};

pub use common::{init_logging, EventBus, EventEnvelope, Topic};
