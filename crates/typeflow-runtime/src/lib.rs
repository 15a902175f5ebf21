//! Workflow execution runtime
//!
//! This crate validates operation graphs, schedules their execution as a DAG
//! with bounded parallelism, resolves operation discriminants from workflow
//! documents, and ties those together in the `FlowRuntime` facade.

mod document;
mod executor;
mod graph;
mod job;
mod registry;
mod runtime;

pub use document::{OperationDocument, WorkflowDocument};
pub use executor::{execute, WorkflowExecutor, DEFAULT_MAX_PARALLEL};
pub use graph::{WorkflowGraph, WorkflowGraphBuilder};
pub use job::{Job, OperationStatus};
pub use registry::{
    ConfigFactory, DiscriminantRegistry, FieldDocumentation, OperationMetadata, OperationRegistry,
    VariantFactory, VariantMetadata,
};
pub use runtime::{FlowRuntime, RuntimeConfig};
