use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use typeflow_core::{
    Operation, OperationContext, OperationError, OperationId, OperationInput, OperationOutput,
    Shape, ValueType,
};
use typeflow_runtime::{FieldDocumentation, OperationMetadata, VariantFactory};

/// Binary operator applied by [`ArithmeticOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArithmeticKind {
    #[default]
    Add,
    Subtract,
    Multiply,
    Divide,
    Exponentiate,
}

impl ArithmeticKind {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            ArithmeticKind::Add => a + b,
            ArithmeticKind::Subtract => a - b,
            ArithmeticKind::Multiply => a * b,
            ArithmeticKind::Divide => a / b,
            ArithmeticKind::Exponentiate => a.powf(b),
        }
    }
}

/// Computes `Input1 <kind> Input2`
pub struct ArithmeticOperation {
    id: OperationId,
    kind: ArithmeticKind,
    inputs: Shape,
    outputs: Shape,
}

impl ArithmeticOperation {
    pub const DISCRIMINANT: &'static str = "arithmetic";

    pub fn new(id: impl Into<OperationId>, kind: ArithmeticKind) -> Self {
        Self {
            id: id.into(),
            kind,
            inputs: Shape::new()
                .field("Input1", ValueType::Number)
                .field("Input2", ValueType::Number),
            outputs: Shape::new().field("Output", ValueType::Number),
        }
    }

    pub fn kind(&self) -> ArithmeticKind {
        self.kind
    }
}

#[async_trait]
impl Operation for ArithmeticOperation {
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
        config.insert("kind".to_string(), json!(self.kind));
        config
    }

    async fn perform(
        &self,
        input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let a = input.require_f64("Input1")?;
        let b = input.require_f64("Input2")?;

        Ok(OperationOutput::new().with_output("Output", self.kind.apply(a, b)))
    }
}

#[derive(Deserialize)]
struct ArithmeticConfig {
    id: OperationId,
    #[serde(default)]
    kind: ArithmeticKind,
}

pub struct ArithmeticOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for ArithmeticOperationFactory {
    fn discriminant(&self) -> &str {
        ArithmeticOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: ArithmeticConfig = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        Ok(Arc::new(ArithmeticOperation::new(config.id, config.kind)))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Arithmetic", "arithmetic")
            .description("Computes a binary arithmetic expression of two numbers")
            .field(FieldDocumentation::optional(
                "kind",
                "Add, Subtract, Multiply, Divide or Exponentiate",
                json!("Add"),
            ))
    }
}

/// Adds a fixed amount to its input
pub struct OffsetOperation {
    id: OperationId,
    amount: f64,
    inputs: Shape,
    outputs: Shape,
}

impl OffsetOperation {
    pub const DISCRIMINANT: &'static str = "offset";

    pub fn new(id: impl Into<OperationId>, amount: f64) -> Self {
        Self {
            id: id.into(),
            amount,
            inputs: Shape::new().field("Input", ValueType::Number),
            outputs: Shape::new().field("Output", ValueType::Number),
        }
    }
}

#[async_trait]
impl Operation for OffsetOperation {
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
        config.insert("amount".to_string(), json!(self.amount));
        config
    }

    async fn perform(
        &self,
        input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let value = input.require_f64("Input")?;
        Ok(OperationOutput::new().with_output("Output", value + self.amount))
    }
}

#[derive(Deserialize)]
struct OffsetConfig {
    id: OperationId,
    #[serde(default)]
    amount: f64,
}

pub struct OffsetOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for OffsetOperationFactory {
    fn discriminant(&self) -> &str {
        OffsetOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: OffsetConfig = serde_json::from_value(fields).map_err(|e| e.to_string())?;
        if !config.amount.is_finite() {
            return Err(format!("amount must be finite, got {}", config.amount));
        }
        Ok(Arc::new(OffsetOperation::new(config.id, config.amount)))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Offset", "arithmetic")
            .description("Adds a configured amount to a number")
            .field(FieldDocumentation::optional("amount", "Amount to add", json!(0.0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_apply_their_operator() {
        assert_eq!(ArithmeticKind::Add.apply(2.0, 3.0), 5.0);
        assert_eq!(ArithmeticKind::Subtract.apply(2.0, 3.0), -1.0);
        assert_eq!(ArithmeticKind::Multiply.apply(2.0, 3.0), 6.0);
        assert_eq!(ArithmeticKind::Divide.apply(3.0, 2.0), 1.5);
        assert_eq!(ArithmeticKind::Exponentiate.apply(2.0, 3.0), 8.0);
        assert!(ArithmeticKind::Divide.apply(1.0, 0.0).is_infinite());
    }

    #[test]
    fn kind_defaults_to_add() {
        let op = ArithmeticOperationFactory
            .create(json!({"id": "a"}))
            .unwrap();
        assert_eq!(op.config()["kind"], json!("Add"));
    }
}
