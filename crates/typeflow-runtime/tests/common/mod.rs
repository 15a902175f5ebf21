#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use typeflow_core::{
    Connection, InputOperation, Operation, OperationContext, OperationError, OperationInput,
    OperationOutput, OutputOperation, Shape, Value, ValueType,
};

type Behavior =
    Arc<dyn Fn(&OperationInput) -> Result<OperationOutput, OperationError> + Send + Sync>;

/// Configurable operation for exercising the scheduler
pub struct TestOp {
    id: String,
    inputs: Shape,
    outputs: Shape,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    wait_for_cancel: bool,
    barrier: Option<Arc<tokio::sync::Barrier>>,
    delay: Option<Duration>,
}

impl TestOp {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            inputs: Shape::new(),
            outputs: Shape::new(),
            behavior: Arc::new(|_| Ok(OperationOutput::new())),
            calls: Arc::new(AtomicUsize::new(0)),
            wait_for_cancel: false,
            barrier: None,
            delay: None,
        }
    }

    /// `Input` number to `Output` number, adding one.
    pub fn add_one(id: &str) -> Self {
        Self::new(id)
            .input("Input", ValueType::Number)
            .output("Output", ValueType::Number)
            .behavior(|input| {
                let x = input.require_f64("Input")?;
                Ok(OperationOutput::new().with_output("Output", x + 1.0))
            })
    }

    /// `Input` any to `Output` any, unchanged.
    pub fn pass(id: &str) -> Self {
        Self::new(id)
            .input("Input", ValueType::Any)
            .output("Output", ValueType::Any)
            .behavior(|input| {
                Ok(OperationOutput::new().with_output("Output", input.require("Input")?.clone()))
            })
    }

    pub fn failing(id: &str) -> Self {
        Self::pass(id).behavior(|_| Err(OperationError::ExecutionFailed("boom".to_string())))
    }

    /// No fields; fails with its own id as the message.
    pub fn failing_source(id: &str) -> Self {
        let message = id.to_string();
        Self::new(id).behavior(move |_| Err(OperationError::ExecutionFailed(message.clone())))
    }

    pub fn input(mut self, name: &str, ty: ValueType) -> Self {
        self.inputs = self.inputs.field(name, ty);
        self
    }

    pub fn output(mut self, name: &str, ty: ValueType) -> Self {
        self.outputs = self.outputs.field(name, ty);
        self
    }

    pub fn behavior(
        mut self,
        behavior: impl Fn(&OperationInput) -> Result<OperationOutput, OperationError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.behavior = Arc::new(behavior);
        self
    }

    /// Never finishes on its own; returns only once cancelled.
    pub fn blocking(mut self) -> Self {
        self.wait_for_cancel = true;
        self
    }

    /// Waits on `barrier` before producing output.
    pub fn rendezvous(mut self, barrier: Arc<tokio::sync::Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    /// Sleeps for `delay` before producing output.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Operation for TestOp {
    fn id(&self) -> &str {
        &self.id
    }

    fn discriminant(&self) -> &str {
        "test"
    }

    fn input_shape(&self) -> &Shape {
        &self.inputs
    }

    fn output_shape(&self) -> &Shape {
        &self.outputs
    }

    async fn perform(
        &self,
        input: OperationInput,
        ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.wait_for_cancel {
            ctx.cancellation.cancelled().await;
            return Err(OperationError::Cancelled);
        }
        (self.behavior)(&input)
    }
}

pub fn input(id: &str, name: &str, ty: ValueType) -> Arc<dyn Operation> {
    Arc::new(InputOperation::new(id, name, ty))
}

pub fn output(id: &str, name: &str, ty: ValueType) -> Arc<dyn Operation> {
    Arc::new(OutputOperation::new(id, name, ty))
}

pub fn op(op: TestOp) -> Arc<dyn Operation> {
    Arc::new(op)
}

pub fn connect(source: &str, source_field: &str, target: &str, target_field: &str) -> Connection {
    Connection::new(source, source_field, target, target_field)
}

pub fn numbers(values: &[f64]) -> Value {
    Value::Array(values.iter().copied().map(Value::Number).collect())
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
