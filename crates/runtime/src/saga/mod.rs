//! Saga definitions and instance state.
//!
//! A saga is an ordered sequence of steps, each invoking one handler on one
//! actor definition. Step inputs and outputs flow through a shared data bag
//! (a JSON object), optionally filtered by per-step mappings. On failure
//! the compensation strategy decides whether completed steps are undone in
//! reverse order or the saga is simply marked failed.

pub mod orchestrator;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{RuntimeError, RuntimeResult};

pub use orchestrator::SagaOrchestrator;

/// What happens to completed steps when a later step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationStrategy {
    /// Undo completed steps in reverse order.
    #[default]
    Backward,
    /// Leave completed steps alone and mark the saga failed.
    Forward,
}

/// The handler invoked to undo a completed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompensationTarget {
    pub actor: String,
    pub handler: String,
}

/// One step of a saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStepDef {
    pub name: String,
    /// Actor definition whose handler runs this step.
    pub actor: String,
    pub handler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationTarget>,
    /// Step input fields, `destination <- source` over the data bag. `None`
    /// passes the whole bag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_mapping: Option<HashMap<String, String>>,
    /// Data bag fields written from the step output, `destination <-
    /// source` over the output object. `None` merges every output field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mapping: Option<HashMap<String, String>>,
}

impl SagaStepDef {
    pub fn new(
        name: impl Into<String>,
        actor: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            actor: actor.into(),
            handler: handler.into(),
            compensation: None,
            input_mapping: None,
            output_mapping: None,
        }
    }

    pub fn with_compensation(
        mut self,
        actor: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        self.compensation = Some(CompensationTarget {
            actor: actor.into(),
            handler: handler.into(),
        });
        self
    }

    pub fn with_input_mapping(mut self, mapping: HashMap<String, String>) -> Self {
        self.input_mapping = Some(mapping);
        self
    }

    pub fn with_output_mapping(mut self, mapping: HashMap<String, String>) -> Self {
        self.output_mapping = Some(mapping);
        self
    }
}

/// Declarative description of a saga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaDefinition {
    pub id: String,
    /// Data bag property used as the correlation id when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_property: Option<String>,
    pub steps: Vec<SagaStepDef>,
    #[serde(default)]
    pub compensation_strategy: CompensationStrategy,
}

impl SagaDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            correlation_property: None,
            steps: Vec::new(),
            compensation_strategy: CompensationStrategy::default(),
        }
    }

    pub fn with_correlation_property(mut self, property: impl Into<String>) -> Self {
        self.correlation_property = Some(property.into());
        self
    }

    pub fn with_step(mut self, step: SagaStepDef) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_strategy(mut self, strategy: CompensationStrategy) -> Self {
        self.compensation_strategy = strategy;
        self
    }

    pub fn validate(&self) -> RuntimeResult<()> {
        if self.id.is_empty() {
            return Err(RuntimeError::validation("saga definition id is empty"));
        }
        if self.steps.is_empty() {
            return Err(RuntimeError::validation(format!(
                "saga '{}' has no steps",
                self.id
            )));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                return Err(RuntimeError::validation(format!(
                    "duplicate step '{}' in saga '{}'",
                    step.name, self.id
                )));
            }
        }
        Ok(())
    }
}

/// Terminal and in-flight saga states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStatus {
    Running,
    Completed,
    /// A step failed and completed steps were compensated.
    Compensated,
    /// A step failed under forward strategy, or compensation is not
    /// applicable; completed work stands.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRecordKind {
    Execution,
    Compensation,
}

/// One entry in a saga instance's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub actor: String,
    pub handler: String,
    pub kind: StepRecordKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Live or finished state of one saga run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaInstance {
    pub id: Uuid,
    pub definition_id: String,
    pub correlation_id: String,
    pub status: SagaStatus,
    /// Shared data bag: step inputs are read from it, outputs merge back.
    pub data: serde_json::Map<String, Value>,
    pub history: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
