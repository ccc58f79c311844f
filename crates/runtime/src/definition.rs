//! Actor definitions and the registries that hold them.
//!
//! A definition is a declarative description of an actor type: the handlers
//! it exposes (with optional JSON shapes for documentation), the policy
//! bindings attached to it, and any mixed-in behaviors whose bindings apply
//! at lower precedence. Implementations (the actual handler closures) are
//! registered separately so the same definition can be wired to different
//! code in tests and production.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actors::handler::HandlerMap;
use crate::error::{RuntimeError, RuntimeResult};
use crate::policy::config::PolicyConfig;
use crate::saga::SagaDefinition;

/// Declares one message handler on an actor definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub name: String,
    /// Optional JSON shape describing the expected input payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_shape: Option<Value>,
    /// Optional JSON shape describing the produced output payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_shape: Option<Value>,
}

impl HandlerSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_shape: None,
            output_shape: None,
        }
    }
}

/// Which handlers a policy binding applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerSelector {
    /// A single named handler.
    Named(String),
    /// Every handler on the definition (the `*` wildcard).
    Any,
}

impl HandlerSelector {
    pub fn matches(&self, handler: &str) -> bool {
        match self {
            Self::Named(name) => name == handler,
            Self::Any => true,
        }
    }
}

/// A policy configuration attached to a definition via a selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub selector: HandlerSelector,
    pub config: PolicyConfig,
}

/// Declarative description of an actor type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorDefinition {
    pub id: String,
    pub handlers: Vec<HandlerSpec>,
    pub policies: Vec<PolicyBinding>,
    /// Mixed-in behaviors. Their policy bindings apply after the
    /// definition's own, so the definition always wins on conflict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<Arc<ActorDefinition>>,
}

impl ActorDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_handler(mut self, spec: HandlerSpec) -> Self {
        self.handlers.push(spec);
        self
    }

    pub fn with_policy(mut self, selector: HandlerSelector, config: PolicyConfig) -> Self {
        self.policies.push(PolicyBinding { selector, config });
        self
    }

    pub fn with_behavior(mut self, behavior: Arc<ActorDefinition>) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Check internal consistency: the definition's own handler names must
    /// be unique, and every named policy selector must reference a handler
    /// declared here or on a mixed-in behavior.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.id.is_empty() {
            return Err(RuntimeError::validation("actor definition id is empty"));
        }
        let mut seen = HashSet::new();
        for spec in &self.handlers {
            if !seen.insert(spec.name.as_str()) {
                return Err(RuntimeError::validation(format!(
                    "duplicate handler '{}' on definition '{}'",
                    spec.name, self.id
                )));
            }
        }
        for binding in &self.policies {
            if let HandlerSelector::Named(name) = &binding.selector {
                if !self.has_handler(name) {
                    return Err(RuntimeError::validation(format!(
                        "policy references unknown handler '{}' on definition '{}'",
                        name, self.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn has_handler(&self, handler: &str) -> bool {
        self.handler_spec(handler).is_some()
    }

    /// The spec for `handler`: the definition's own declaration wins,
    /// behaviors are consulted in declaration order.
    pub fn handler_spec(&self, handler: &str) -> Option<&HandlerSpec> {
        self.handlers
            .iter()
            .find(|spec| spec.name == handler)
            .or_else(|| {
                self.behaviors
                    .iter()
                    .find_map(|behavior| behavior.handler_spec(handler))
            })
    }

    /// All policy bindings in precedence order: the definition's own first,
    /// then each behavior's in declaration order.
    pub fn policy_bindings(&self) -> impl Iterator<Item = &PolicyBinding> {
        self.policies
            .iter()
            .chain(self.behaviors.iter().flat_map(|b| b.policies.iter()))
    }
}

/// Lookup of declarative definitions by id.
pub trait DefinitionRegistry: Send + Sync {
    fn actor_definition(&self, id: &str) -> Option<Arc<ActorDefinition>>;
    fn saga_definition(&self, id: &str) -> Option<Arc<SagaDefinition>>;
}

/// Lookup of handler implementations for a definition id.
pub trait ImplementationRegistry: Send + Sync {
    fn implementation(&self, definition_id: &str) -> Option<Arc<HandlerMap>>;
}

/// Process-local registry backing both lookup traits.
#[derive(Default)]
pub struct InMemoryRegistry {
    actors: RwLock<HashMap<String, Arc<ActorDefinition>>>,
    sagas: RwLock<HashMap<String, Arc<SagaDefinition>>>,
    implementations: RwLock<HashMap<String, Arc<HandlerMap>>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_actor(&self, definition: ActorDefinition) -> RuntimeResult<Arc<ActorDefinition>> {
        definition.validate()?;
        let definition = Arc::new(definition);
        self.actors
            .write()
            .insert(definition.id.clone(), Arc::clone(&definition));
        Ok(definition)
    }

    pub fn register_saga(&self, definition: SagaDefinition) -> RuntimeResult<Arc<SagaDefinition>> {
        definition.validate()?;
        let definition = Arc::new(definition);
        self.sagas
            .write()
            .insert(definition.id.clone(), Arc::clone(&definition));
        Ok(definition)
    }

    pub fn register_implementation(&self, definition_id: impl Into<String>, handlers: HandlerMap) {
        self.implementations
            .write()
            .insert(definition_id.into(), Arc::new(handlers));
    }
}

impl DefinitionRegistry for InMemoryRegistry {
    fn actor_definition(&self, id: &str) -> Option<Arc<ActorDefinition>> {
        self.actors.read().get(id).cloned()
    }

    fn saga_definition(&self, id: &str) -> Option<Arc<SagaDefinition>> {
        self.sagas.read().get(id).cloned()
    }
}

impl ImplementationRegistry for InMemoryRegistry {
    fn implementation(&self, definition_id: &str) -> Option<Arc<HandlerMap>> {
        self.implementations.read().get(definition_id).cloned()
    }
}
