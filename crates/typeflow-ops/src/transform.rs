use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use typeflow_core::{
    Operation, OperationContext, OperationError, OperationId, OperationInput, OperationOutput,
    Shape, Value, ValueType,
};
use typeflow_runtime::{FieldDocumentation, OperationMetadata, VariantFactory};

#[derive(Deserialize)]
struct IdOnly {
    id: OperationId,
}

/// Parse JSON string to Value
pub struct JsonParseOperation {
    id: OperationId,
    inputs: Shape,
    outputs: Shape,
}

impl JsonParseOperation {
    pub const DISCRIMINANT: &'static str = "jsonParse";

    pub fn new(id: impl Into<OperationId>) -> Self {
        Self {
            id: id.into(),
            inputs: Shape::new().field("Input", ValueType::String),
            outputs: Shape::new().field("Output", ValueType::Json),
        }
    }
}

#[async_trait]
impl Operation for JsonParseOperation {
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
        input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let text = input.require_str("Input")?;

        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| OperationError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(OperationOutput::new().with_output("Output", Value::Json(parsed)))
    }
}

pub struct JsonParseOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for JsonParseOperationFactory {
    fn discriminant(&self) -> &str {
        JsonParseOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: IdOnly = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        Ok(Arc::new(JsonParseOperation::new(config.id)))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Parse JSON", "transform").description("Parse JSON string")
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyOperation {
    id: OperationId,
    pretty: bool,
    inputs: Shape,
    outputs: Shape,
}

impl JsonStringifyOperation {
    pub const DISCRIMINANT: &'static str = "jsonStringify";

    pub fn new(id: impl Into<OperationId>, pretty: bool) -> Self {
        Self {
            id: id.into(),
            pretty,
            inputs: Shape::new().field("Input", ValueType::Any),
            outputs: Shape::new().field("Output", ValueType::String),
        }
    }
}

#[async_trait]
impl Operation for JsonStringifyOperation {
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
        config.insert("pretty".to_string(), json!(self.pretty));
        config
    }

    async fn perform(
        &self,
        input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let value = input.require("Input")?.to_json();

        let text = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .map_err(|e| OperationError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(OperationOutput::new().with_output("Output", text))
    }
}

#[derive(Deserialize)]
struct StringifyConfig {
    id: OperationId,
    #[serde(default)]
    pretty: bool,
}

pub struct JsonStringifyOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for JsonStringifyOperationFactory {
    fn discriminant(&self) -> &str {
        JsonStringifyOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: StringifyConfig = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        Ok(Arc::new(JsonStringifyOperation::new(config.id, config.pretty)))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Stringify JSON", "transform")
            .description("Convert value to JSON string")
            .field(FieldDocumentation::optional(
                "pretty",
                "Indent the output",
                json!(false),
            ))
    }
}
