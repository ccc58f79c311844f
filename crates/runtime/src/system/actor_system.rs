//! The actor system: spawning, lookup, routing, and shutdown.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use common::EventBus;

use crate::actors::handler::HandlerMap;
use crate::actors::mailbox::MailboxWorker;
use crate::actors::{ActorId, ActorRef, InstanceShared};
use crate::config::RuntimeConfig;
use crate::definition::{DefinitionRegistry, ImplementationRegistry};
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::{RuntimeEvent, RuntimeEventPublisher};
use crate::policy::{PolicyEngine, SystemPolicy};

use super::metrics::{MetricsSnapshot, SystemMetrics};

struct InstanceEntry {
    actor: ActorRef,
    worker: JoinHandle<()>,
}

pub struct ActorSystem {
    config: RuntimeConfig,
    definitions: Arc<dyn DefinitionRegistry>,
    implementations: Arc<dyn ImplementationRegistry>,
    engine: Arc<PolicyEngine>,
    instances: DashMap<ActorId, InstanceEntry>,
    metrics: Arc<SystemMetrics>,
    events: RuntimeEventPublisher,
    shutdown: CancellationToken,
}

impl ActorSystem {
    pub fn new(
        config: RuntimeConfig,
        definitions: Arc<dyn DefinitionRegistry>,
        implementations: Arc<dyn ImplementationRegistry>,
        system_policies: Vec<SystemPolicy>,
    ) -> Self {
        let bus: Arc<EventBus<RuntimeEvent>> = Arc::new(EventBus::new(
            config.event_bus_buffer,
            config.event_publish_timeout,
        ));
        let events = RuntimeEventPublisher::new(bus);
        let engine = Arc::new(PolicyEngine::new(system_policies, events.clone()));
        Self {
            config,
            definitions,
            implementations,
            engine,
            instances: DashMap::new(),
            metrics: Arc::new(SystemMetrics::default()),
            events,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn events(&self) -> &RuntimeEventPublisher {
        &self.events
    }

    /// Spawn a new instance of a registered definition.
    pub fn create_actor(&self, definition_id: &str) -> RuntimeResult<ActorRef> {
        let definition = self
            .definitions
            .actor_definition(definition_id)
            .ok_or_else(|| RuntimeError::UnknownDefinition(definition_id.to_string()))?;

        if self.instances.len() >= self.config.max_actors {
            return Err(RuntimeError::CapacityExceeded(self.config.max_actors));
        }

        let handlers = self
            .implementations
            .implementation(definition_id)
            .unwrap_or_else(|| Arc::new(HandlerMap::new()));

        let id = ActorId::new();
        let shared = Arc::new(InstanceShared::new());
        let (sender, receiver) = mpsc::unbounded_channel();

        let actor = ActorRef {
            id,
            definition: Arc::clone(&definition),
            sender,
            shared: Arc::clone(&shared),
            metrics: Arc::clone(&self.metrics),
            events: self.events.clone(),
        };

        let worker = MailboxWorker {
            id,
            definition,
            handlers,
            receiver,
            shared,
            engine: Arc::clone(&self.engine),
            metrics: Arc::clone(&self.metrics),
            events: self.events.clone(),
            shutdown: self.shutdown.child_token(),
        };
        let handle = tokio::spawn(worker.run());

        info!(actor_id = %id, definition = definition_id, "actor created");
        self.instances.insert(
            id,
            InstanceEntry {
                actor: actor.clone(),
                worker: handle,
            },
        );
        Ok(actor)
    }

    pub fn actor(&self, id: ActorId) -> Option<ActorRef> {
        self.instances.get(&id).map(|entry| entry.actor.clone())
    }

    /// First live instance of a definition, if any.
    pub fn actor_for_definition(&self, definition_id: &str) -> Option<ActorRef> {
        self.instances.iter().find_map(|entry| {
            let actor = &entry.actor;
            (actor.definition_id() == definition_id && actor.status().is_live())
                .then(|| actor.clone())
        })
    }

    pub async fn ask(&self, id: ActorId, handler: &str, payload: Value) -> RuntimeResult<Value> {
        match self.actor(id) {
            Some(actor) => actor.ask(handler, payload).await,
            None => {
                self.unknown_actor(id, handler).await;
                Err(RuntimeError::UnknownActor(id.to_string()))
            }
        }
    }

    pub async fn tell(&self, id: ActorId, handler: &str, payload: Value) -> RuntimeResult<()> {
        match self.actor(id) {
            Some(actor) => {
                actor.tell(handler, payload).await;
                Ok(())
            }
            None => {
                self.unknown_actor(id, handler).await;
                Err(RuntimeError::UnknownActor(id.to_string()))
            }
        }
    }

    pub fn stop_actor(&self, id: ActorId) -> RuntimeResult<()> {
        let actor = self
            .actor(id)
            .ok_or_else(|| RuntimeError::UnknownActor(id.to_string()))?;
        actor.stop();
        Ok(())
    }

    pub fn restart_actor(&self, id: ActorId) -> RuntimeResult<()> {
        let actor = self
            .actor(id)
            .ok_or_else(|| RuntimeError::UnknownActor(id.to_string()))?;
        actor.restart()
    }

    pub fn stop_all(&self) {
        for entry in self.instances.iter() {
            entry.actor.stop();
        }
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        let active = self
            .instances
            .iter()
            .filter(|entry| entry.actor.status().is_live())
            .count();
        self.metrics.snapshot(active)
    }

    /// Shut the system down: cancel all workers and wait for them to drain.
    pub async fn shutdown(&self) {
        info!(actors = self.instances.len(), "actor system shutting down");
        self.shutdown.cancel();
        let ids: Vec<ActorId> = self.instances.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, entry)) = self.instances.remove(&id) {
                if entry.worker.await.is_err() {
                    warn!(actor_id = %id, "mailbox worker panicked during shutdown");
                }
            }
        }
    }

    async fn unknown_actor(&self, id: ActorId, handler: &str) {
        warn!(actor_id = %id, handler, "message to unknown actor dead-lettered");
        self.metrics.record_dead_letter();
        self.events
            .dead_letter(&id.to_string(), Some(handler), "unknown actor")
            .await;
    }
}
