use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use typeflow_core::{
    Operation, OperationContext, OperationError, OperationId, OperationInput, OperationOutput,
    Shape, ValueType,
};
use typeflow_runtime::{OperationMetadata, VariantFactory};

/// Simple debug operation that logs the value passing through it
pub struct DebugOperation {
    id: OperationId,
    inputs: Shape,
    outputs: Shape,
}

impl DebugOperation {
    pub const DISCRIMINANT: &'static str = "debug";

    pub fn new(id: impl Into<OperationId>) -> Self {
        Self {
            id: id.into(),
            inputs: Shape::new().field("Value", ValueType::Any),
            outputs: Shape::new().field("Value", ValueType::Any),
        }
    }
}

#[async_trait]
impl Operation for DebugOperation {
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

    async fn perform(
        &self,
        mut input: OperationInput,
        ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let value = input
            .take("Value")
            .ok_or_else(|| OperationError::MissingInput("Value".to_string()))?;

        let rendered = value.to_json().to_string();
        tracing::info!(operation = %self.id, "DEBUG: {}", rendered);
        ctx.events.info(format!("DEBUG: {}", rendered));

        Ok(OperationOutput::new().with_output("Value", value))
    }
}

#[derive(Deserialize)]
struct DebugConfig {
    id: OperationId,
}

pub struct DebugOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for DebugOperationFactory {
    fn discriminant(&self) -> &str {
        DebugOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: DebugConfig = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        Ok(Arc::new(DebugOperation::new(config.id)))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Debug", "debug").description("Logs values for debugging")
    }
}
