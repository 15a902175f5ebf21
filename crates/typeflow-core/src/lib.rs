//! Core abstractions for the typed operation engine
//!
//! This crate provides the value model, field shapes, the `Operation`
//! contract with its boundary operations, connections, and the type
//! conversion resolver. It knows nothing about scheduling.

pub mod boundary;
mod connection;
pub mod conversion;
mod error;
pub mod events;
mod operation;
mod shape;
mod value;

pub use boundary::{InputOperation, OutputOperation, VALUE_FIELD};
pub use connection::{Connection, ConnectionPoint};
pub use conversion::{ConversionContext, MultiHopConverter, TypeConverter, TypeResolver};
pub use error::{
    ConversionError, DocumentError, ExecutionError, FlowError, GraphDefinitionError,
    OperationError, RegistryError,
};
pub use events::*;
pub use operation::{
    Operation, OperationContext, OperationId, OperationInput, OperationOutput, OperationRole,
};
pub use shape::{FieldDescriptor, Shape};
pub use value::{Value, ValueType};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
