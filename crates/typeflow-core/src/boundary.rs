//! Boundary operations connecting a workflow to its caller.
//!
//! Neither operation touches the job: the scheduler injects the external
//! binding into an [`InputOperation`]'s `Value` input and copies an
//! [`OutputOperation`]'s `Value` input into the job's external outputs.

use crate::{
    Operation, OperationContext, OperationError, OperationId, OperationInput, OperationOutput,
    OperationRole, Shape, ValueType,
};
use async_trait::async_trait;
use serde_json::json;

/// Name of the single field of both boundary operations.
pub const VALUE_FIELD: &str = "Value";

/// Emits the external input `name` as its `Value` output
pub struct InputOperation {
    id: OperationId,
    name: String,
    ty: ValueType,
    description: Option<String>,
    input_shape: Shape,
    output_shape: Shape,
}

impl InputOperation {
    pub const DISCRIMINANT: &'static str = "workflowInput";

    pub fn new(id: impl Into<OperationId>, name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output_shape: Shape::new().field(VALUE_FIELD, ty.clone()),
            input_shape: Shape::new(),
            ty,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }
}

#[async_trait]
impl Operation for InputOperation {
    fn id(&self) -> &str {
        &self.id
    }

    fn discriminant(&self) -> &str {
        Self::DISCRIMINANT
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn role(&self) -> OperationRole {
        OperationRole::ExternalInput {
            name: self.name.clone(),
        }
    }

    fn config(&self) -> serde_json::Map<String, serde_json::Value> {
        boundary_config(&self.name, &self.ty, self.description.as_deref())
    }

    async fn perform(
        &self,
        mut input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let value = input
            .take(VALUE_FIELD)
            .ok_or_else(|| OperationError::MissingInput(VALUE_FIELD.to_string()))?;
        Ok(OperationOutput::new().with_output(VALUE_FIELD, value))
    }
}

/// Accepts `Value` and publishes it as the external output `name`
pub struct OutputOperation {
    id: OperationId,
    name: String,
    ty: ValueType,
    description: Option<String>,
    input_shape: Shape,
    output_shape: Shape,
}

impl OutputOperation {
    pub const DISCRIMINANT: &'static str = "workflowOutput";

    pub fn new(id: impl Into<OperationId>, name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input_shape: Shape::new().field(VALUE_FIELD, ty.clone()),
            output_shape: Shape::new(),
            ty,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }
}

#[async_trait]
impl Operation for OutputOperation {
    fn id(&self) -> &str {
        &self.id
    }

    fn discriminant(&self) -> &str {
        Self::DISCRIMINANT
    }

    fn input_shape(&self) -> &Shape {
        &self.input_shape
    }

    fn output_shape(&self) -> &Shape {
        &self.output_shape
    }

    fn role(&self) -> OperationRole {
        OperationRole::ExternalOutput {
            name: self.name.clone(),
        }
    }

    fn config(&self) -> serde_json::Map<String, serde_json::Value> {
        boundary_config(&self.name, &self.ty, self.description.as_deref())
    }

    async fn perform(
        &self,
        input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        input.require(VALUE_FIELD)?;
        Ok(OperationOutput::new())
    }
}

fn boundary_config(
    name: &str,
    ty: &ValueType,
    description: Option<&str>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut config = serde_json::Map::new();
    config.insert("name".to_string(), json!(name));
    config.insert("type".to_string(), json!(ty));
    if let Some(description) = description {
        config.insert("description".to_string(), json!(description));
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[tokio::test]
    async fn input_operation_forwards_injected_value() {
        let op = InputOperation::new("1", "foo", ValueType::Integer);
        let ctx = OperationContext::detached("1");
        let output = op
            .perform(OperationInput::new().with_input(VALUE_FIELD, 42i64), &ctx)
            .await
            .unwrap();
        assert_eq!(output.get(VALUE_FIELD), Some(&Value::Integer(42)));
        assert!(op.input_shape().is_empty());
        assert_eq!(
            op.role(),
            OperationRole::ExternalInput {
                name: "foo".to_string()
            }
        );
    }

    #[tokio::test]
    async fn output_operation_requires_value() {
        let op = OutputOperation::new("2", "bar", ValueType::Integer);
        let ctx = OperationContext::detached("2");
        let err = op.perform(OperationInput::new(), &ctx).await.unwrap_err();
        assert!(matches!(err, OperationError::MissingInput(field) if field == VALUE_FIELD));
        assert!(op.output_shape().is_empty());
    }

    #[test]
    fn config_round_trips_name_and_type() {
        let op = OutputOperation::new("2", "bar", ValueType::array(ValueType::Number))
            .with_description("result");
        let config = op.config();
        assert_eq!(config["name"], json!("bar"));
        assert_eq!(config["type"], json!({"array": "number"}));
        assert_eq!(config["description"], json!("result"));
    }
}
