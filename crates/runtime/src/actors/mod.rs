//! Actor instances: identity, lifecycle, and the message-passing surface.
//!
//! Every instance owns a serialized mailbox drained by a dedicated worker
//! task ([`mailbox::MailboxWorker`]). `tell` enqueues and returns, `ask`
//! enqueues and awaits a reply. Stopping is synchronous from the caller's
//! point of view: the status flips immediately, queued messages are
//! rejected at dequeue time, and only the in-flight message (if any)
//! finishes.

pub mod handler;
pub mod mailbox;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::definition::ActorDefinition;
use crate::error::{RuntimeError, RuntimeResult};
use crate::events::RuntimeEventPublisher;
use crate::system::metrics::SystemMetrics;

/// Unique identity of a spawned actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(pub Uuid);

impl ActorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorStatus {
    /// Spawned and waiting for messages.
    Idle,
    /// Currently processing a message.
    Running,
    /// Stopped by request; messages are rejected until restart.
    Stopped,
    /// A tell-mode message escaped its policies with a terminal error.
    Failed,
}

impl ActorStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }
}

impl fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Whether a message expects a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Tell,
    Ask,
}

pub(crate) struct Envelope {
    pub handler: String,
    pub payload: Value,
    pub reply: Option<oneshot::Sender<RuntimeResult<Value>>>,
    /// Restart epoch at enqueue time. The worker drops envelopes from an
    /// earlier epoch, which is how restart clears the mailbox.
    pub epoch: u64,
}

/// State shared between an [`ActorRef`] and its mailbox worker.
pub(crate) struct InstanceShared {
    pub status: RwLock<ActorStatus>,
    pub epoch: AtomicU64,
    pub failures: AtomicU32,
}

impl InstanceShared {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ActorStatus::Idle),
            epoch: AtomicU64::new(0),
            failures: AtomicU32::new(0),
        }
    }
}

/// Handle to a spawned actor instance.
#[derive(Clone)]
pub struct ActorRef {
    pub(crate) id: ActorId,
    pub(crate) definition: Arc<ActorDefinition>,
    pub(crate) sender: mpsc::UnboundedSender<Envelope>,
    pub(crate) shared: Arc<InstanceShared>,
    pub(crate) metrics: Arc<SystemMetrics>,
    pub(crate) events: RuntimeEventPublisher,
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("definition", &self.definition.id)
            .finish()
    }
}

impl ActorRef {
    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn definition_id(&self) -> &str {
        &self.definition.id
    }

    pub fn status(&self) -> ActorStatus {
        *self.shared.status.read()
    }

    /// Unhandled failures since spawn or the last restart.
    pub fn failure_count(&self) -> u32 {
        self.shared.failures.load(Ordering::Acquire)
    }

    /// Fire-and-forget send. A send to a stopped or failed actor becomes a
    /// dead letter; the caller is not notified.
    pub async fn tell(&self, handler: &str, payload: Value) {
        let status = self.status();
        if !status.is_live() {
            self.reject(handler, &status).await;
            return;
        }
        let envelope = Envelope {
            handler: handler.to_string(),
            payload,
            reply: None,
            epoch: self.shared.epoch.load(Ordering::Acquire),
        };
        if self.sender.send(envelope).is_err() {
            // Worker gone: system shut down underneath us.
            self.reject(handler, &ActorStatus::Stopped).await;
        }
    }

    /// Request/response send. Resolves with the handler's output or the
    /// error that survived the policy stack.
    pub async fn ask(&self, handler: &str, payload: Value) -> RuntimeResult<Value> {
        let status = self.status();
        if !status.is_live() {
            self.reject(handler, &status).await;
            return Err(RuntimeError::ActorStopped(self.id.to_string()));
        }
        let (tx, rx) = oneshot::channel();
        let envelope = Envelope {
            handler: handler.to_string(),
            payload,
            reply: Some(tx),
            epoch: self.shared.epoch.load(Ordering::Acquire),
        };
        if self.sender.send(envelope).is_err() {
            self.reject(handler, &ActorStatus::Stopped).await;
            return Err(RuntimeError::ActorStopped(self.id.to_string()));
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RuntimeError::handler("actor terminated before replying")),
        }
    }

    /// Stop the actor. Takes effect immediately for new sends; queued
    /// messages are rejected as dead letters when the worker reaches them.
    pub fn stop(&self) {
        let mut status = self.shared.status.write();
        if status.is_live() {
            debug!(actor_id = %self.id, definition = %self.definition.id, "stopping actor");
            *status = ActorStatus::Stopped;
        }
    }

    /// Restart a stopped or failed actor with a logically empty mailbox.
    pub fn restart(&self) -> RuntimeResult<()> {
        let mut status = self.shared.status.write();
        match *status {
            ActorStatus::Stopped | ActorStatus::Failed => {
                self.shared.epoch.fetch_add(1, Ordering::AcqRel);
                self.shared.failures.store(0, Ordering::Release);
                *status = ActorStatus::Idle;
                debug!(actor_id = %self.id, definition = %self.definition.id, "actor restarted");
                Ok(())
            }
            current => Err(RuntimeError::validation(format!(
                "cannot restart actor '{}' in state {current}",
                self.id
            ))),
        }
    }

    async fn reject(&self, handler: &str, status: &ActorStatus) {
        warn!(
            actor_id = %self.id,
            definition = %self.definition.id,
            handler,
            status = %status,
            "message to non-live actor dead-lettered"
        );
        self.metrics.record_dead_letter();
        self.events
            .dead_letter(
                &self.definition.id,
                Some(handler),
                &format!("actor {status}"),
            )
            .await;
    }
}
