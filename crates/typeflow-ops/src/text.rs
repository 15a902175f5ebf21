use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use typeflow_core::{
    Operation, OperationContext, OperationError, OperationId, OperationInput, OperationOutput,
    Shape, ValueType,
};
use typeflow_runtime::{FieldDocumentation, OperationMetadata, VariantFactory};

/// Replaces every match of a pattern in the input text.
///
/// A pattern wrapped in slashes (`/\d+/`) is a regular expression; anything
/// else is matched literally.
pub struct TextReplaceOperation {
    id: OperationId,
    pattern: String,
    replacement: String,
    regex: Regex,
    inputs: Shape,
    outputs: Shape,
}

impl TextReplaceOperation {
    pub const DISCRIMINANT: &'static str = "textReplace";

    pub fn new(
        id: impl Into<OperationId>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Result<Self, OperationError> {
        let pattern = pattern.into();
        let regex = compile(&pattern)
            .map_err(|e| OperationError::Configuration(format!("invalid pattern: {}", e)))?;

        Ok(Self {
            id: id.into(),
            pattern,
            replacement: replacement.into(),
            regex,
            inputs: Shape::new().field("Input", ValueType::String),
            outputs: Shape::new().field("Output", ValueType::String),
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    match pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
    {
        Some(expression) => Regex::new(expression),
        None => Regex::new(&regex::escape(pattern)),
    }
}

#[async_trait]
impl Operation for TextReplaceOperation {
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
        config.insert("pattern".to_string(), json!(self.pattern));
        config.insert("replacement".to_string(), json!(self.replacement));
        config
    }

    async fn perform(
        &self,
        input: OperationInput,
        _ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let text = input.require_str("Input")?;
        let replaced = self.regex.replace_all(text, self.replacement.as_str());

        Ok(OperationOutput::new().with_output("Output", replaced.into_owned()))
    }
}

#[derive(Deserialize)]
struct TextReplaceConfig {
    id: OperationId,
    pattern: String,
    #[serde(default)]
    replacement: String,
}

pub struct TextReplaceOperationFactory;

impl VariantFactory<Arc<dyn Operation>> for TextReplaceOperationFactory {
    fn discriminant(&self) -> &str {
        TextReplaceOperation::DISCRIMINANT
    }

    fn create(&self, fields: serde_json::Value) -> Result<Arc<dyn Operation>, String> {
        let config: TextReplaceConfig =
            serde_json::from_value(fields).map_err(|e| e.to_string())?;
        let op = TextReplaceOperation::new(config.id, config.pattern, config.replacement)
            .map_err(|e| e.to_string())?;
        Ok(Arc::new(op))
    }

    fn metadata(&self) -> OperationMetadata {
        OperationMetadata::new("Text Replace", "text")
            .description("Replaces occurrences of a pattern in text")
            .field(FieldDocumentation::required(
                "pattern",
                "Literal text, or a regular expression between slashes",
            ))
            .field(FieldDocumentation::optional(
                "replacement",
                "Replacement text; `$1` refers to capture groups",
                json!(""),
            ))
    }
}
