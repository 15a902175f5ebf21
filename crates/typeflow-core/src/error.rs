use crate::{OperationId, ValueType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph definition error: {0}")]
    Graph(#[from] GraphDefinitionError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),
}

/// Static errors raised while constructing a workflow graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphDefinitionError {
    #[error("Operation '{operation}' is declared more than once")]
    DuplicateOperation { operation: OperationId },

    #[error("Connection {connection} references unknown operation '{operation}'")]
    UnknownOperation {
        connection: String,
        operation: OperationId,
    },

    #[error("Operation '{operation}' has no output field '{field}'")]
    UnknownSourceField { operation: OperationId, field: String },

    #[error("Operation '{operation}' has no input field '{field}'")]
    UnknownTargetField { operation: OperationId, field: String },

    #[error("Input field '{field}' of operation '{operation}' is the target of more than one connection")]
    DuplicateTarget { operation: OperationId, field: String },

    #[error("Connections form a cycle through operations [{}]", .operations.join(", "))]
    Cycle { operations: Vec<OperationId> },

    #[error("Connection {connection} cannot convert {source_type} to {target_type}")]
    IncompatibleTypes {
        connection: String,
        source_type: ValueType,
        target_type: ValueType,
    },

    #[error("Multiplexed connection {connection} needs an array source, found {source_type}")]
    MultiplexRequiresArray {
        connection: String,
        source_type: ValueType,
    },

    #[error("Required input field '{field}' of operation '{operation}' is not connected")]
    UnboundInput { operation: OperationId, field: String },

    #[error("External field '{name}' is declared as both {first} and {second}")]
    ConflictingExternalField {
        name: String,
        first: ValueType,
        second: ValueType,
    },
}

/// A conversion between two field types that could not be performed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot convert {source_type} to {target_type}{}: {reason}", context_suffix(.context))]
pub struct ConversionError {
    pub source_type: ValueType,
    pub target_type: ValueType,
    pub reason: String,
    /// Field or connection the conversion was performed for.
    pub context: Option<String>,
    /// Failures of rules that were tried and skipped before giving up.
    pub attempts: Vec<String>,
}

fn context_suffix(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" for {}", context),
        None => String::new(),
    }
}

impl ConversionError {
    pub fn new(source_type: ValueType, target_type: ValueType, reason: impl Into<String>) -> Self {
        Self {
            source_type,
            target_type,
            reason: reason.into(),
            context: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<String>) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Failure reported by a single operation's `perform`.
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Declared output '{0}' was not produced")]
    MissingOutput(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Nested workflow failed: {0}")]
    Workflow(#[source] Box<ExecutionError>),

    #[error("{0}")]
    External(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Cancelled")]
    Cancelled,
}

/// Runtime errors returned by a workflow execution, attributed to the
/// operation that caused them.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Operation '{operation}' is missing external input '{name}' for field '{field}'")]
    MissingInput {
        operation: OperationId,
        field: String,
        name: String,
    },

    #[error("Cannot bind field '{field}' of operation '{operation}': {error}")]
    Conversion {
        operation: OperationId,
        field: String,
        #[source]
        error: ConversionError,
    },

    #[error("Operation '{operation}' failed: {error}")]
    Operation {
        operation: OperationId,
        #[source]
        error: OperationError,
    },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Task join error: {0}")]
    Task(String),
}

impl ExecutionError {
    /// The operation the error is attributed to, if any.
    pub fn operation(&self) -> Option<&str> {
        match self {
            ExecutionError::MissingInput { operation, .. }
            | ExecutionError::Conversion { operation, .. }
            | ExecutionError::Operation { operation, .. } => Some(operation),
            ExecutionError::Cancelled | ExecutionError::Task(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Unknown {family} discriminant '{discriminant}'")]
    UnknownDiscriminant {
        family: String,
        discriminant: String,
    },

    #[error("Discriminant '{discriminant}' is already registered for {family}")]
    DuplicateDiscriminant {
        family: String,
        discriminant: String,
    },

    #[error("Invalid fields for {family} '{discriminant}': {reason}")]
    InvalidFields {
        family: String,
        discriminant: String,
        reason: String,
    },
}

/// Errors raised while turning a workflow document into a graph.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Graph(#[from] GraphDefinitionError),

    #[error("Malformed workflow document: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_names_types_and_context() {
        let err = ConversionError::new(ValueType::String, ValueType::Number, "not a number")
            .with_context("field 'Input' of operation 'b'");
        let message = err.to_string();
        assert!(message.contains("string"));
        assert!(message.contains("number"));
        assert!(message.contains("field 'Input' of operation 'b'"));
    }

    #[test]
    fn cycle_error_lists_operations() {
        let err = GraphDefinitionError::Cycle {
            operations: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Connections form a cycle through operations [a, b]"
        );
    }

    #[test]
    fn execution_error_reports_attributed_operation() {
        let err = ExecutionError::Operation {
            operation: "b".to_string(),
            error: OperationError::ExecutionFailed("boom".to_string()),
        };
        assert_eq!(err.operation(), Some("b"));
        assert!(err.to_string().contains("boom"));
        assert_eq!(ExecutionError::Cancelled.operation(), None);
    }
}
