//! Standard operation library
//!
//! Collection of built-in operations for common computations

mod arithmetic;
mod debug;
mod text;
mod time;
mod transform;

pub use arithmetic::{
    ArithmeticKind, ArithmeticOperation, ArithmeticOperationFactory, OffsetOperation,
    OffsetOperationFactory,
};
pub use debug::{DebugOperation, DebugOperationFactory};
pub use text::{TextReplaceOperation, TextReplaceOperationFactory};
pub use time::{DelayOperation, DelayOperationFactory};
pub use transform::{
    JsonParseOperation, JsonParseOperationFactory, JsonStringifyOperation,
    JsonStringifyOperationFactory,
};

use std::sync::Arc;
use typeflow_core::RegistryError;
use typeflow_runtime::OperationRegistry;

/// Register all standard operations with a registry
pub fn register_all(registry: &mut OperationRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(ArithmeticOperationFactory))?;
    registry.register(Arc::new(OffsetOperationFactory))?;
    registry.register(Arc::new(TextReplaceOperationFactory))?;
    registry.register(Arc::new(JsonParseOperationFactory))?;
    registry.register(Arc::new(JsonStringifyOperationFactory))?;
    registry.register(Arc::new(DelayOperationFactory))?;
    registry.register(Arc::new(DebugOperationFactory))?;
    Ok(())
}

/// Registry with the workflow built-ins and every standard operation
pub fn standard_registry() -> Result<OperationRegistry, RegistryError> {
    let mut registry = OperationRegistry::with_builtins();
    register_all(&mut registry)?;
    Ok(registry)
}
