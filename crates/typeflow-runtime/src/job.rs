use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;
use typeflow_core::{JobId, OperationId, Value};

/// Progress of one operation within a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Not started yet; stays here if the job stopped first
    Pending,
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl OperationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed(_) | OperationStatus::Cancelled
        )
    }
}

/// State of a single execution of a workflow graph.
///
/// A job owns the external inputs it was started with, the outputs written by
/// output operations, and every value produced along the way. Jobs are never
/// shared between executions.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    external_inputs: BTreeMap<String, Value>,
    external_outputs: BTreeMap<String, Value>,
    /// Execution-order position of the operation that wrote each output
    writers: BTreeMap<String, usize>,
    cache: HashMap<OperationId, BTreeMap<String, Value>>,
    statuses: BTreeMap<OperationId, OperationStatus>,
    cancellation: CancellationToken,
}

impl Job {
    pub fn new(inputs: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::with_cancellation(inputs, CancellationToken::new())
    }

    /// A job that is also cancelled whenever `cancellation` is.
    pub fn with_cancellation(
        inputs: impl IntoIterator<Item = (String, Value)>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            id: JobId::new_v4(),
            external_inputs: inputs.into_iter().collect(),
            external_outputs: BTreeMap::new(),
            writers: BTreeMap::new(),
            cache: HashMap::new(),
            statuses: BTreeMap::new(),
            cancellation,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Token that cancels this job. Clones may be moved to other tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn external_input(&self, name: &str) -> Option<&Value> {
        self.external_inputs.get(name)
    }

    pub fn external_inputs(&self) -> &BTreeMap<String, Value> {
        &self.external_inputs
    }

    pub fn external_outputs(&self) -> &BTreeMap<String, Value> {
        &self.external_outputs
    }

    pub fn into_external_outputs(self) -> BTreeMap<String, Value> {
        self.external_outputs
    }

    /// A value produced by an operation earlier in this job.
    pub fn cached(&self, operation: &str, field: &str) -> Option<&Value> {
        self.cache.get(operation)?.get(field)
    }

    /// Status of an operation, once the job has been run.
    pub fn status(&self, operation: &str) -> Option<&OperationStatus> {
        self.statuses.get(operation)
    }

    pub fn statuses(&self) -> &BTreeMap<OperationId, OperationStatus> {
        &self.statuses
    }

    pub(crate) fn set_status(&mut self, operation: &str, status: OperationStatus) {
        self.statuses.insert(operation.to_string(), status);
    }

    pub(crate) fn store(&mut self, operation: &str, outputs: BTreeMap<String, Value>) {
        self.cache
            .entry(operation.to_string())
            .or_default()
            .extend(outputs);
    }

    /// Records an external output. When several output operations share a
    /// name, the one latest in execution order wins regardless of which
    /// finished first.
    pub(crate) fn write_external_output(&mut self, name: String, value: Value, position: usize) {
        if let Some(&existing) = self.writers.get(&name) {
            if existing > position {
                return;
            }
        }
        self.writers.insert(name.clone(), position);
        self.external_outputs.insert(name, value);
    }
}
