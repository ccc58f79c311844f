//! Saga orchestrator: drives step execution, data mapping, and
//! compensation over the actor system.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::actors::ActorRef;
use crate::error::{RuntimeError, RuntimeResult};
use crate::system::ActorSystem;

use super::{
    CompensationStrategy, SagaDefinition, SagaInstance, SagaStatus, SagaStepDef, StepRecord,
    StepRecordKind,
};

pub struct SagaOrchestrator {
    system: Arc<ActorSystem>,
    instances: DashMap<Uuid, SagaInstance>,
}

impl SagaOrchestrator {
    pub fn new(system: Arc<ActorSystem>) -> Self {
        Self {
            system,
            instances: DashMap::new(),
        }
    }

    /// Run a saga to completion (or compensation) and return its final
    /// state. The instance stays queryable via [`Self::instance`] until
    /// cleared.
    pub async fn start(
        &self,
        definition: &SagaDefinition,
        initial_input: Value,
    ) -> RuntimeResult<SagaInstance> {
        definition.validate()?;
        let data = match initial_input {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(RuntimeError::validation(format!(
                    "saga input must be a JSON object, got {other}"
                )))
            }
        };

        let correlation_id = definition
            .correlation_property
            .as_ref()
            .and_then(|prop| data.get(prop))
            .map(value_to_correlation)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut instance = SagaInstance {
            id: Uuid::new_v4(),
            definition_id: definition.id.clone(),
            correlation_id,
            status: SagaStatus::Running,
            data,
            history: Vec::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        info!(
            saga = %definition.id,
            instance = %instance.id,
            correlation_id = %instance.correlation_id,
            "saga started"
        );
        self.instances.insert(instance.id, instance.clone());

        let outcome = self.run_forward(definition, &mut instance).await;

        match outcome {
            Ok(()) => {
                instance.status = SagaStatus::Completed;
                info!(saga = %definition.id, instance = %instance.id, "saga completed");
            }
            Err(err) => {
                instance.error = Some(err.to_string());
                match definition.compensation_strategy {
                    CompensationStrategy::Backward => {
                        warn!(
                            saga = %definition.id,
                            instance = %instance.id,
                            error = %err,
                            "saga step failed, compensating"
                        );
                        self.compensate(definition, &mut instance).await;
                        instance.status = SagaStatus::Compensated;
                    }
                    CompensationStrategy::Forward => {
                        error!(
                            saga = %definition.id,
                            instance = %instance.id,
                            error = %err,
                            "saga step failed, completed work stands"
                        );
                        instance.status = SagaStatus::Failed;
                    }
                }
            }
        }
        instance.completed_at = Some(Utc::now());
        self.instances.insert(instance.id, instance.clone());
        Ok(instance)
    }

    pub fn instance(&self, id: Uuid) -> Option<SagaInstance> {
        self.instances.get(&id).map(|entry| entry.value().clone())
    }

    pub fn clear(&self, id: Uuid) -> bool {
        self.instances.remove(&id).is_some()
    }

    pub fn clear_all(&self) {
        self.instances.clear();
    }

    async fn run_forward(
        &self,
        definition: &SagaDefinition,
        instance: &mut SagaInstance,
    ) -> RuntimeResult<()> {
        for step in &definition.steps {
            debug!(
                saga = %definition.id,
                instance = %instance.id,
                step = %step.name,
                actor = %step.actor,
                handler = %step.handler,
                "executing saga step"
            );
            let input = build_step_input(step, &instance.data);
            let output = self.invoke(&step.actor, &step.handler, input).await?;
            merge_step_output(step, &output, &mut instance.data);
            instance.history.push(StepRecord {
                step: step.name.clone(),
                actor: step.actor.clone(),
                handler: step.handler.clone(),
                kind: StepRecordKind::Execution,
                output: Some(output),
                error: None,
                at: Utc::now(),
            });
            self.system
                .events()
                .saga_step_completed(&definition.id, instance.id, &step.name)
                .await;
            self.instances.insert(instance.id, instance.clone());
        }
        Ok(())
    }

    /// Undo completed steps in reverse order. Best effort, single pass: a
    /// failed compensation is recorded and the walk continues.
    async fn compensate(&self, definition: &SagaDefinition, instance: &mut SagaInstance) {
        let executed: Vec<StepRecord> = instance
            .history
            .iter()
            .filter(|record| record.kind == StepRecordKind::Execution)
            .cloned()
            .collect();

        for record in executed.iter().rev() {
            let Some(step) = definition.steps.iter().find(|s| s.name == record.step) else {
                continue;
            };
            let Some(compensation) = &step.compensation else {
                debug!(
                    saga = %definition.id,
                    instance = %instance.id,
                    step = %step.name,
                    "step has no compensation, skipping"
                );
                continue;
            };
            let input = record.output.clone().unwrap_or(Value::Null);
            let result = self
                .invoke(&compensation.actor, &compensation.handler, input)
                .await;
            let comp_error = result.as_ref().err().map(ToString::to_string);
            if let Some(err) = &comp_error {
                error!(
                    saga = %definition.id,
                    instance = %instance.id,
                    step = %step.name,
                    error = %err,
                    "compensation failed"
                );
            }
            instance.history.push(StepRecord {
                step: step.name.clone(),
                actor: compensation.actor.clone(),
                handler: compensation.handler.clone(),
                kind: StepRecordKind::Compensation,
                output: result.ok(),
                error: comp_error.clone(),
                at: Utc::now(),
            });
            self.system
                .events()
                .saga_step_compensated(
                    &definition.id,
                    instance.id,
                    &step.name,
                    comp_error.as_deref(),
                )
                .await;
        }
    }

    /// Ask an existing live instance of the target definition, spawning one
    /// on demand.
    async fn invoke(&self, actor: &str, handler: &str, payload: Value) -> RuntimeResult<Value> {
        let target: ActorRef = match self.system.actor_for_definition(actor) {
            Some(actor) => actor,
            None => self.system.create_actor(actor)?,
        };
        target.ask(handler, payload).await
    }
}

fn value_to_correlation(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build a step's input payload from the data bag.
fn build_step_input(step: &SagaStepDef, data: &Map<String, Value>) -> Value {
    match &step.input_mapping {
        None => Value::Object(data.clone()),
        Some(mapping) => {
            let mut input = Map::new();
            for (dest, source) in mapping {
                if let Some(value) = data.get(source) {
                    input.insert(dest.clone(), value.clone());
                }
            }
            Value::Object(input)
        }
    }
}

/// Merge a step's output back into the data bag.
fn merge_step_output(step: &SagaStepDef, output: &Value, data: &mut Map<String, Value>) {
    match &step.output_mapping {
        None => {
            if let Value::Object(fields) = output {
                for (key, value) in fields {
                    data.insert(key.clone(), value.clone());
                }
            }
        }
        Some(mapping) => {
            for (dest, source) in mapping {
                if let Some(value) = output.get(source) {
                    data.insert(dest.clone(), value.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn bag(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn unmapped_input_passes_whole_bag() {
        let step = SagaStepDef::new("s", "a", "h");
        let data = bag(json!({ "order_id": "o-1", "amount": 40 }));
        assert_eq!(
            build_step_input(&step, &data),
            json!({ "order_id": "o-1", "amount": 40 })
        );
    }

    #[test]
    fn input_mapping_selects_and_renames() {
        let step = SagaStepDef::new("s", "a", "h").with_input_mapping(HashMap::from([(
            "total".to_string(),
            "amount".to_string(),
        )]));
        let data = bag(json!({ "order_id": "o-1", "amount": 40 }));
        assert_eq!(build_step_input(&step, &data), json!({ "total": 40 }));
    }

    #[test]
    fn unmapped_output_merges_object_fields() {
        let step = SagaStepDef::new("s", "a", "h");
        let mut data = bag(json!({ "order_id": "o-1" }));
        merge_step_output(&step, &json!({ "charge_id": "c-9" }), &mut data);
        assert_eq!(data.get("charge_id"), Some(&json!("c-9")));
        assert_eq!(data.get("order_id"), Some(&json!("o-1")));
    }

    #[test]
    fn output_mapping_selects_and_renames() {
        let step = SagaStepDef::new("s", "a", "h").with_output_mapping(HashMap::from([(
            "payment_ref".to_string(),
            "charge_id".to_string(),
        )]));
        let mut data = bag(json!({}));
        merge_step_output(&step, &json!({ "charge_id": "c-9", "noise": 1 }), &mut data);
        assert_eq!(data.get("payment_ref"), Some(&json!("c-9")));
        assert!(data.get("noise").is_none());
        assert!(data.get("charge_id").is_none());
    }

    #[test]
    fn non_object_output_without_mapping_is_ignored() {
        let step = SagaStepDef::new("s", "a", "h");
        let mut data = bag(json!({ "keep": true }));
        merge_step_output(&step, &json!("scalar"), &mut data);
        assert_eq!(data.len(), 1);
    }
}
