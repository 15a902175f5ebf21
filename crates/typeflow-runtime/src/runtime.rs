use crate::document::WorkflowDocument;
use crate::executor::{WorkflowExecutor, DEFAULT_MAX_PARALLEL};
use crate::graph::WorkflowGraph;
use crate::job::Job;
use crate::registry::OperationRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use typeflow_core::{
    DocumentError, EventBus, ExecutionError, ExecutionEvent, FlowError, TypeResolver, Value,
};

/// Main runtime for loading and executing workflows
pub struct FlowRuntime {
    registry: Arc<OperationRegistry>,
    resolver: Arc<TypeResolver>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
    workflows: Arc<RwLock<HashMap<String, Arc<WorkflowGraph>>>>,
}

impl FlowRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        let registry = Arc::new(OperationRegistry::with_builtins());
        Self::with_registry(registry, config)
    }

    /// Create a new runtime with a pre-configured registry
    pub fn with_registry(registry: Arc<OperationRegistry>, config: RuntimeConfig) -> Self {
        Self::with_parts(registry, Arc::new(TypeResolver::with_defaults()), config)
    }

    /// Create a new runtime with a pre-configured registry and conversion rules
    pub fn with_parts(
        registry: Arc<OperationRegistry>,
        resolver: Arc<TypeResolver>,
        config: RuntimeConfig,
    ) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(config.max_parallel_operations));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry,
            resolver,
            executor,
            event_bus,
            workflows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &Arc<TypeResolver> {
        &self.resolver
    }

    /// Build and validate a graph from a document
    pub fn load(&self, document: &WorkflowDocument) -> Result<WorkflowGraph, DocumentError> {
        document.build(&self.registry, self.resolver.clone())
    }

    pub fn load_json(&self, json: &str) -> Result<WorkflowGraph, DocumentError> {
        self.load(&WorkflowDocument::from_json(json)?)
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<WorkflowGraph, FlowError> {
        let document = WorkflowDocument::from_file(path)?;
        Ok(self.load(&document)?)
    }

    /// Register a workflow under its graph id
    pub async fn register_workflow(&self, graph: WorkflowGraph) -> Arc<WorkflowGraph> {
        let graph = Arc::new(graph);
        let mut workflows = self.workflows.write().await;
        tracing::info!("Registering workflow: {}", graph.id());
        workflows.insert(graph.id().to_string(), graph.clone());
        graph
    }

    /// Execute a registered workflow by id
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        inputs: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, FlowError> {
        let graph = {
            let workflows = self.workflows.read().await;
            workflows
                .get(workflow_id)
                .cloned()
                .ok_or_else(|| FlowError::WorkflowNotFound(workflow_id.to_string()))?
        };

        Ok(self.execute(&graph, inputs).await?)
    }

    /// Execute a workflow directly (without registration)
    pub async fn execute(
        &self,
        graph: &WorkflowGraph,
        inputs: BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        self.executor.execute(graph, inputs, &self.event_bus).await
    }

    /// Execute in a caller-owned job, e.g. to keep its cancellation token
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        job: Job,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        self.executor.run(graph, job, &self.event_bus).await
    }

    /// Execute in a borrowed job; operation statuses stay readable on the job
    pub async fn run_job(&self, graph: &WorkflowGraph, job: &mut Job) -> Result<(), ExecutionError> {
        self.executor.run_job(graph, job, &self.event_bus).await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for FlowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_parallel_operations: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_operations: DEFAULT_MAX_PARALLEL,
            event_buffer_size: 1000,
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
