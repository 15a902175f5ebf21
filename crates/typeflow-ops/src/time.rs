use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use typeflow_core::{
    Operation, OperationContext, OperationError, OperationId, OperationInput, OperationOutput,
    Shape, ValueType,
};
use typeflow_runtime::{FieldDocumentation, OperationMetadata, VariantFactory};

/// Delay execution for a specified duration, then pass the value through
pub struct DelayOperation {
    id: OperationId,
    milliseconds: u64,
    inputs: Shape,
    outputs: Shape,
}

impl DelayOperation {
    pub const DISCRIMINANT: &'static str = "delay";

    pub fn new(id: impl Into<OperationId>, milliseconds: u64) -> Self {
        Self {
            id: id.into(),
            milliseconds,
            inputs: Shape::new().field("Value", ValueType::Any),
            outputs: Shape::new().field("Value", ValueType::Any),
        }
    }
}

#[async_trait]
impl Operation for DelayOperation {
    fn id(&self) -> &str {
        &self.id
    }

    fn discriminant(&self) -> &str {
        Self::DISCRIMINANT
    }

    fn input_shape(&self) -> &Shape {
        &self.inputs
    }

    fn output_shape(&self) -> &Shape {
        &self.outputs
    }

    fn config(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut config = serde_json::Map::new();
        config.insert("milliseconds".to_string(), json!(self.milliseconds));
        config
    }

    async fn perform(
        &self,
        mut input: OperationInput,
        ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        ctx.events.info(format!("Delaying for {}ms", self.milliseconds));

        tokio::select! {
            _ = sleep(Duration::from_millis(self.milliseconds)) => {}
            _ = ctx.cancellation.cancelled() => return Err(OperationError::Cancelled),
        }

        let value = input
            .take("Value")
            .ok_or_else(|| OperationError::MissingInput("Value".to_string()))?;
        Ok(OperationOutput::new().with_output("Value", value))
    }
}

#[derive(Deserialize)]
struct DelayConfig {
    id: OperationId,
    #[serde(default = "default_delay")]
    milliseconds: u64,
}

// Default to 1 second if not specified
fn default_delay() -> u64 {
    1000
}

pub struct DelayOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for DelayOperationFactory {
    fn discriminant(&self) -> &str {
        DelayOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: DelayConfig = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        Ok(Arc::new(DelayOperation::new(config.id, config.milliseconds)))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Delay", "workflow")
            .description("Delay execution for specified milliseconds")
            .field(FieldDocumentation::optional(
                "milliseconds",
                "How long to wait",
                json!(default_delay()),
            ))
    }
}
