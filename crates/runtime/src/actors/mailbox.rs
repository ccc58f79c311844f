//! The mailbox worker: one task per actor instance, draining envelopes in
//! FIFO order, one at a time.
//!
//! The worker never exits on stop, only on system shutdown. A stopped actor
//! keeps its worker parked on the channel so a later restart needs no
//! respawn; the restart epoch makes the worker discard anything enqueued
//! before the restart.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::definition::ActorDefinition;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::RuntimeEventPublisher;
use crate::policy::PolicyEngine;
use crate::system::metrics::SystemMetrics;

use super::handler::HandlerMap;
use super::{ActorId, ActorStatus, Envelope, InstanceShared, SendMode};

pub(crate) struct MailboxWorker {
    pub id: ActorId,
    pub definition: Arc<ActorDefinition>,
    pub handlers: Arc<HandlerMap>,
    pub receiver: mpsc::UnboundedReceiver<Envelope>,
    pub shared: Arc<InstanceShared>,
    pub engine: Arc<PolicyEngine>,
    pub metrics: Arc<SystemMetrics>,
    pub events: RuntimeEventPublisher,
    pub shutdown: CancellationToken,
}

impl MailboxWorker {
    pub async fn run(mut self) {
        debug!(actor_id = %self.id, definition = %self.definition.id, "mailbox worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                envelope = self.receiver.recv() => match envelope {
                    Some(envelope) => self.dispatch(envelope).await,
                    None => break,
                },
            }
        }
        // Reject whatever is still queued so askers are not left hanging.
        while let Ok(envelope) = self.receiver.try_recv() {
            self.reject(envelope, "system shutdown").await;
        }
        debug!(actor_id = %self.id, definition = %self.definition.id, "mailbox worker exited");
    }

    async fn dispatch(&self, envelope: Envelope) {
        if envelope.epoch < self.shared.epoch.load(Ordering::Acquire) {
            trace!(actor_id = %self.id, handler = %envelope.handler, "stale envelope rejected");
            self.reject(envelope, "mailbox cleared by restart").await;
            return;
        }
        let status = *self.shared.status.read();
        if !status.is_live() {
            self.reject(envelope, &format!("actor {status}")).await;
            return;
        }
        *self.shared.status.write() = ActorStatus::Running;
        self.process(envelope).await;
        // Processing may have marked the actor failed or a caller may have
        // stopped it; only a still-running actor goes back to idle.
        let mut current = self.shared.status.write();
        if *current == ActorStatus::Running {
            *current = ActorStatus::Idle;
        }
    }

    async fn process(&self, envelope: Envelope) {
        let mode = if envelope.reply.is_some() {
            SendMode::Ask
        } else {
            SendMode::Tell
        };
        self.metrics.record_message();
        let result = self.invoke(&envelope.handler, envelope.payload.clone()).await;

        if let Err(err) = &result {
            if mode == SendMode::Tell
                && matches!(err, RuntimeError::Handler(_) | RuntimeError::Timeout { .. })
            {
                self.shared.failures.fetch_add(1, Ordering::AcqRel);
                *self.shared.status.write() = ActorStatus::Failed;
                error!(
                    actor_id = %self.id,
                    definition = %self.definition.id,
                    handler = %envelope.handler,
                    error = %err,
                    "unhandled message failure, actor marked failed"
                );
            }
            if err.is_policy_rejection() || mode == SendMode::Tell {
                self.metrics.record_dead_letter();
                self.events
                    .dead_letter(&self.definition.id, Some(&envelope.handler), &err.to_string())
                    .await;
            }
        }

        if let Some(reply) = envelope.reply {
            // The asker may have given up waiting; that is not an error.
            let _ = reply.send(result);
        }
    }

    async fn invoke(&self, handler: &str, payload: Value) -> RuntimeResult<Value> {
        if !self.definition.has_handler(handler) {
            return Err(RuntimeError::UnknownHandler {
                actor: self.definition.id.clone(),
                handler: handler.to_string(),
            });
        }
        let Some(implementation) = self.handlers.get(handler) else {
            return Err(RuntimeError::HandlerNotImplemented {
                actor: self.definition.id.clone(),
                handler: handler.to_string(),
            });
        };

        let policy = self.engine.resolve(&self.definition, handler);
        self.engine
            .execute(&policy, || {
                let implementation = Arc::clone(&implementation);
                let payload = payload.clone();
                async move {
                    implementation
                        .handle(payload)
                        .await
                        .map_err(|err| RuntimeError::Handler(err.to_string()))
                }
            })
            .await
    }

    async fn reject(&self, envelope: Envelope, reason: &str) {
        self.metrics.record_dead_letter();
        self.events
            .dead_letter(&self.definition.id, Some(&envelope.handler), reason)
            .await;
        if let Some(reply) = envelope.reply {
            let _ = reply.send(Err(RuntimeError::ActorStopped(self.id.to_string())));
        }
    }
}
