use crate::{events::EventEmitter, OperationError, Shape, Value, ValueType};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

pub type OperationId = String;

/// How the scheduler binds an operation to the job's external fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRole {
    /// Ordinary operation fed only by connections.
    Compute,
    /// Receives `ExternalInputs[name]` as its `Value` input.
    ExternalInput { name: String },
    /// Its `Value` input is written to `ExternalOutputs[name]`.
    ExternalOutput { name: String },
}

/// Core trait that all executable operations implement
#[async_trait]
pub trait Operation: Send + Sync {
    /// Identifier unique within the owning workflow
    fn id(&self) -> &str;

    /// Registry tag for this operation kind (e.g. "arithmetic", "workflowInput")
    fn discriminant(&self) -> &str;

    fn input_shape(&self) -> &Shape;

    fn output_shape(&self) -> &Shape;

    fn role(&self) -> OperationRole {
        OperationRole::Compute
    }

    /// Construction-time settings, written back out when a graph is saved.
    fn config(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    /// Transform input to output. Must depend only on `input` and the
    /// operation's own configuration.
    async fn perform(
        &self,
        input: OperationInput,
        ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError>;
}

/// Per-invocation context handed to `perform`
#[derive(Clone)]
pub struct OperationContext {
    pub operation_id: OperationId,

    /// Cancelled when the owning job is cancelled or fails
    pub cancellation: CancellationToken,

    /// Event emitter for progress and diagnostics
    pub events: EventEmitter,
}

impl OperationContext {
    pub fn new(
        operation_id: impl Into<OperationId>,
        cancellation: CancellationToken,
        events: EventEmitter,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            cancellation,
            events,
        }
    }

    /// A context with a fresh token and an emitter nobody listens to.
    pub fn detached(operation_id: impl Into<OperationId>) -> Self {
        let operation_id = operation_id.into();
        Self {
            events: EventEmitter::disconnected(operation_id.clone()),
            operation_id,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Named input values assembled by the scheduler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationInput {
    values: BTreeMap<String, Value>,
}

impl OperationInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Get required input or return error
    pub fn require(&self, field: &str) -> Result<&Value, OperationError> {
        self.values
            .get(field)
            .ok_or_else(|| OperationError::MissingInput(field.to_string()))
    }

    pub fn require_f64(&self, field: &str) -> Result<f64, OperationError> {
        let value = self.require(field)?;
        value.as_f64().ok_or_else(|| OperationError::InvalidInputType {
            field: field.to_string(),
            expected: ValueType::Number,
            actual: value.value_type(),
        })
    }

    pub fn require_str(&self, field: &str) -> Result<&str, OperationError> {
        let value = self.require(field)?;
        value.as_str().ok_or_else(|| OperationError::InvalidInputType {
            field: field.to_string(),
            expected: ValueType::String,
            actual: value.value_type(),
        })
    }

    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.values.remove(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl From<BTreeMap<String, Value>> for OperationInput {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Output field values produced by `perform`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationOutput {
    outputs: BTreeMap<String, Value>,
}

impl OperationOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.outputs.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.outputs.get(field)
    }

    pub fn take(&mut self, field: &str) -> Option<Value> {
        self.outputs.remove(field)
    }

    pub fn into_outputs(self) -> BTreeMap<String, Value> {
        self.outputs
    }
}

impl From<BTreeMap<String, Value>> for OperationOutput {
    fn from(outputs: BTreeMap<String, Value>) -> Self {
        Self { outputs }
    }
}
