use crate::graph::WorkflowGraph;
use crate::job::{Job, OperationStatus};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use typeflow_core::{
    Connection, ConversionError, EventBus, ExecutionError, ExecutionEvent, Operation,
    OperationContext, OperationError, OperationInput, OperationOutput, OperationRole, Value,
    ValueType, VALUE_FIELD,
};

/// Default upper bound on operations running at once within a job
pub const DEFAULT_MAX_PARALLEL: usize = 32;

/// Executes workflow graphs as DAGs with bounded parallelism
#[derive(Debug, Clone)]
pub struct WorkflowExecutor {
    max_parallel: usize,
}

/// Inputs assembled for one scheduled operation
enum Invocation {
    Single(OperationInput),
    /// One input set per element of the multiplexed fields
    Multiplexed(Vec<OperationInput>),
}

struct Scheduled {
    invocation: Invocation,
    /// Value published under an external output name once the operation succeeds
    external_output: Option<(String, Value)>,
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL)
    }
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Runs the graph in a fresh job and returns its external outputs.
    pub async fn execute(
        &self,
        graph: &WorkflowGraph,
        inputs: BTreeMap<String, Value>,
        event_bus: &EventBus,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        self.run(graph, Job::new(inputs), event_bus).await
    }

    /// Runs the graph in a caller-supplied job, so the caller can keep the
    /// job's cancellation token.
    pub async fn run(
        &self,
        graph: &WorkflowGraph,
        mut job: Job,
        event_bus: &EventBus,
    ) -> Result<BTreeMap<String, Value>, ExecutionError> {
        self.run_job(graph, &mut job, event_bus).await?;
        Ok(job.into_external_outputs())
    }

    /// Runs the graph in a borrowed job. The job keeps its cache and the
    /// status of every operation afterwards, whether or not the run failed.
    pub async fn run_job(
        &self,
        graph: &WorkflowGraph,
        job: &mut Job,
        event_bus: &EventBus,
    ) -> Result<(), ExecutionError> {
        let job_id = job.id();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::JobStarted {
            job_id,
            operations: graph.len(),
            timestamp: Utc::now(),
        });

        tracing::info!(%job_id, "Starting job for workflow {}", graph.id());

        let result = self.execute_dag(graph, job, event_bus).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::JobCompleted {
            job_id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        match &result {
            Ok(()) => tracing::info!(%job_id, "Job completed in {}ms", duration_ms),
            Err(e) => tracing::warn!(%job_id, "Job failed after {}ms: {}", duration_ms, e),
        }

        result
    }

    async fn execute_dag(
        &self,
        graph: &WorkflowGraph,
        job: &mut Job,
        event_bus: &EventBus,
    ) -> Result<(), ExecutionError> {
        let job_id = job.id();
        let cancellation = job.cancellation_token();
        // Cancelled on a failure or job cancellation without touching the caller's token
        let run_token = cancellation.child_token();

        let order = graph.order_indices();
        let mut position = vec![0; graph.len()];
        for (p, &i) in order.iter().enumerate() {
            position[i] = p;
            job.set_status(graph.operation_at(i).id(), OperationStatus::Pending);
        }

        let mut pending: Vec<usize> = (0..graph.len())
            .map(|i| graph.upstream_at(i).len())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = (0..graph.len())
            .filter(|&i| pending[i] == 0)
            .map(|i| Reverse(position[i]))
            .collect();
        let mut publish: HashMap<usize, (String, Value)> = HashMap::new();
        let mut in_flight: BTreeMap<usize, CancellationToken> = BTreeMap::new();
        let mut running = FuturesUnordered::new();
        // Earliest failure in execution order seen so far
        let mut failure: Option<(usize, ExecutionError)> = None;

        loop {
            if cancellation.is_cancelled() {
                run_token.cancel();
                mark_cancelled(graph, job, &order, &in_flight);
                return Err(ExecutionError::Cancelled);
            }

            // Start ready operations, earliest in execution order first. After a
            // failure only operations ordered before it may still start.
            while running.len() < self.max_parallel {
                let cutoff = failure.as_ref().map_or(usize::MAX, |(p, _)| *p);
                match ready.peek() {
                    Some(&Reverse(p)) if p < cutoff => {}
                    _ => break,
                }
                let Some(Reverse(p)) = ready.pop() else {
                    break;
                };
                let i = order[p];
                let operation = graph.operation_at(i).clone();

                let scheduled = match assemble(graph, job, i) {
                    Ok(scheduled) => scheduled,
                    Err(e) => {
                        self.report_failure(event_bus, job_id, operation.id(), &e);
                        job.set_status(operation.id(), OperationStatus::Failed(e.to_string()));
                        record_failure(&mut failure, &in_flight, p, e);
                        continue;
                    }
                };
                if let Some(external) = scheduled.external_output {
                    publish.insert(i, external);
                }

                event_bus.emit(ExecutionEvent::OperationStarted {
                    job_id,
                    operation_id: operation.id().to_string(),
                    discriminant: operation.discriminant().to_string(),
                    timestamp: Utc::now(),
                });
                tracing::debug!(%job_id, "Starting operation {}", operation.id());
                job.set_status(operation.id(), OperationStatus::Running);

                let token = run_token.child_token();
                in_flight.insert(p, token.clone());
                let ctx = OperationContext::new(
                    operation.id(),
                    token,
                    event_bus.create_emitter(job_id, operation.id().to_string()),
                );
                let invocation = scheduled.invocation;

                running.push(tokio::spawn(async move {
                    let start = Instant::now();
                    let result = tokio::select! {
                        biased;
                        _ = ctx.cancellation.cancelled() => Err(OperationError::Cancelled),
                        result = invoke(operation.as_ref(), invocation, &ctx) => result,
                    };
                    (i, result, start.elapsed().as_millis() as u64)
                }));
            }

            if running.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    run_token.cancel();
                    mark_cancelled(graph, job, &order, &in_flight);
                    return Err(ExecutionError::Cancelled);
                }
                joined = running.next() => joined,
            };
            let Some(joined) = joined else {
                break;
            };
            let (i, result, duration_ms) = joined.map_err(|e| {
                run_token.cancel();
                ExecutionError::Task(e.to_string())
            })?;
            let p = position[i];
            in_flight.remove(&p);
            let operation = graph.operation_at(i);

            match result {
                Ok(output) => {
                    tracing::info!(%job_id, "Operation {} completed in {}ms", operation.id(), duration_ms);

                    event_bus.emit(ExecutionEvent::OperationCompleted {
                        job_id,
                        operation_id: operation.id().to_string(),
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    job.set_status(operation.id(), OperationStatus::Completed);

                    if let Some((name, value)) = publish.remove(&i) {
                        job.write_external_output(name, value, position[i]);
                    }
                    job.store(operation.id(), output.into_outputs());

                    for &next in graph.downstream_at(i) {
                        pending[next] -= 1;
                        if pending[next] == 0 {
                            ready.push(Reverse(position[next]));
                        }
                    }
                }
                Err(error) => {
                    if cancellation.is_cancelled() {
                        run_token.cancel();
                        job.set_status(operation.id(), OperationStatus::Cancelled);
                        mark_cancelled(graph, job, &order, &in_flight);
                        return Err(ExecutionError::Cancelled);
                    }
                    let superseded = failure.as_ref().is_some_and(|(first, _)| *first < p);
                    if superseded {
                        // Stopped because an operation ordered before it failed
                        tracing::debug!(%job_id, "Operation {} stopped after earlier failure: {}", operation.id(), error);
                        job.set_status(operation.id(), OperationStatus::Cancelled);
                        continue;
                    }

                    let error = ExecutionError::Operation {
                        operation: operation.id().to_string(),
                        error,
                    };
                    self.report_failure(event_bus, job_id, operation.id(), &error);
                    job.set_status(operation.id(), OperationStatus::Failed(error.to_string()));
                    record_failure(&mut failure, &in_flight, p, error);
                }
            }
        }

        run_token.cancel();
        match failure {
            Some((_, error)) => Err(error),
            None => Ok(()),
        }
    }

    fn report_failure(
        &self,
        event_bus: &EventBus,
        job_id: typeflow_core::JobId,
        operation: &str,
        error: &ExecutionError,
    ) {
        tracing::error!(%job_id, "Operation {} failed: {}", operation, error);

        event_bus.emit(ExecutionEvent::OperationFailed {
            job_id,
            operation_id: operation.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Keeps the failure earliest in execution order and stops every in-flight
/// operation ordered after it. Operations ordered before it run to completion,
/// so the reported error is the one a sequential run would hit first.
fn record_failure(
    failure: &mut Option<(usize, ExecutionError)>,
    in_flight: &BTreeMap<usize, CancellationToken>,
    position: usize,
    error: ExecutionError,
) {
    if failure.as_ref().is_some_and(|(first, _)| *first < position) {
        return;
    }
    for token in in_flight.range(position + 1..).map(|(_, token)| token) {
        token.cancel();
    }
    *failure = Some((position, error));
}

fn mark_cancelled(
    graph: &WorkflowGraph,
    job: &mut Job,
    order: &[usize],
    in_flight: &BTreeMap<usize, CancellationToken>,
) {
    for &p in in_flight.keys() {
        job.set_status(graph.operation_at(order[p]).id(), OperationStatus::Cancelled);
    }
}

/// Runs a graph once with the default executor and a private event bus.
pub async fn execute(
    graph: &WorkflowGraph,
    inputs: BTreeMap<String, Value>,
) -> Result<BTreeMap<String, Value>, ExecutionError> {
    WorkflowExecutor::default()
        .execute(graph, inputs, &EventBus::default())
        .await
}

/// Binds the inputs of operation `i` from the job's external inputs and the
/// values its upstream operations produced.
fn assemble(graph: &WorkflowGraph, job: &Job, i: usize) -> Result<Scheduled, ExecutionError> {
    let operation = graph.operation_at(i);
    let resolver = graph.resolver();
    let mut base = OperationInput::new();
    let mut multiplexed: Vec<(String, Vec<Value>)> = Vec::new();

    if let OperationRole::ExternalInput { name } = operation.role() {
        let value = job
            .external_input(&name)
            .ok_or_else(|| ExecutionError::MissingInput {
                operation: operation.id().to_string(),
                field: VALUE_FIELD.to_string(),
                name: name.clone(),
            })?;
        let ty = operation
            .output_shape()
            .get(VALUE_FIELD)
            .map(|f| f.ty.clone())
            .unwrap_or(ValueType::Any);
        let converted = resolver
            .convert_value(&ty, value)
            .map_err(|error| ExecutionError::Conversion {
                operation: operation.id().to_string(),
                field: VALUE_FIELD.to_string(),
                error: error.with_context(format!("external input '{}'", name)),
            })?;
        base.insert(VALUE_FIELD, converted);
    }

    for field in operation.input_shape() {
        let connections: Vec<&Connection> = graph
            .incoming_at(i)
            .filter(|c| c.target.field == field.name)
            .collect();
        if connections.is_empty() {
            continue;
        }

        let bind_error = |connection: &Connection, error: ConversionError| {
            ExecutionError::Conversion {
                operation: operation.id().to_string(),
                field: field.name.clone(),
                error: error.with_context(connection.to_string()),
            }
        };

        if connections.iter().any(|c| c.multiplex) {
            let mut elements = Vec::new();
            for connection in connections {
                let (source_type, value) = upstream_value(graph, job, connection)?;
                let element_type = source_type.element().cloned().unwrap_or(ValueType::Any);
                let items = match value {
                    Value::Array(items) => items.clone(),
                    Value::Json(serde_json::Value::Array(items)) => {
                        items.iter().cloned().map(Value::from_json).collect()
                    }
                    other => {
                        return Err(bind_error(
                            connection,
                            ConversionError::new(
                                other.value_type(),
                                ValueType::array(field.ty.clone()),
                                "multiplexed value is not an array",
                            ),
                        ))
                    }
                };
                for item in &items {
                    let converted = resolver
                        .try_convert(&element_type, &field.ty, item)
                        .map_err(|error| bind_error(connection, error))?;
                    elements.push(converted);
                }
            }
            multiplexed.push((field.name.clone(), elements));
        } else {
            let connection = connections[0];
            let (source_type, value) = upstream_value(graph, job, connection)?;
            let converted = resolver
                .try_convert(&source_type, &field.ty, value)
                .map_err(|error| bind_error(connection, error))?;
            base.insert(field.name.clone(), converted);
        }
    }

    let invocation = if multiplexed.is_empty() {
        Invocation::Single(base)
    } else {
        let cardinality = multiplexed
            .iter()
            .map(|(_, values)| values.len())
            .min()
            .unwrap_or(0);
        let inputs = (0..cardinality)
            .map(|k| {
                let mut input = base.clone();
                for (field, values) in &multiplexed {
                    input.insert(field.clone(), values[k].clone());
                }
                input
            })
            .collect();
        Invocation::Multiplexed(inputs)
    };

    let external_output = match operation.role() {
        OperationRole::ExternalOutput { name } => {
            let value = match &invocation {
                Invocation::Single(input) => input.get(VALUE_FIELD).cloned(),
                Invocation::Multiplexed(inputs) => Some(Value::Array(
                    inputs
                        .iter()
                        .filter_map(|input| input.get(VALUE_FIELD).cloned())
                        .collect(),
                )),
            };
            value.map(|value| (name, value))
        }
        _ => None,
    };

    Ok(Scheduled {
        invocation,
        external_output,
    })
}

fn upstream_value<'a>(
    graph: &WorkflowGraph,
    job: &'a Job,
    connection: &Connection,
) -> Result<(ValueType, &'a Value), ExecutionError> {
    let source = &connection.source;
    let value = job
        .cached(&source.operation, &source.field)
        .ok_or_else(|| ExecutionError::Operation {
            operation: source.operation.clone(),
            error: OperationError::MissingOutput(source.field.clone()),
        })?;
    let ty = graph
        .effective_output_type(&source.operation, &source.field)
        .unwrap_or_else(|| value.value_type());
    Ok((ty, value))
}

async fn invoke(
    operation: &dyn Operation,
    invocation: Invocation,
    ctx: &OperationContext,
) -> Result<OperationOutput, OperationError> {
    match invocation {
        Invocation::Single(input) => {
            let output = operation.perform(input, ctx).await?;
            for field in operation.output_shape().iter().filter(|f| f.required) {
                if output.get(&field.name).is_none() {
                    return Err(OperationError::MissingOutput(field.name.clone()));
                }
            }
            Ok(output)
        }
        Invocation::Multiplexed(inputs) => {
            let mut collected: Vec<(String, bool, Vec<Value>)> = operation
                .output_shape()
                .iter()
                .map(|f| (f.name.clone(), f.required, Vec::with_capacity(inputs.len())))
                .collect();

            for input in inputs {
                let mut output = operation.perform(input, ctx).await?;
                for (field, required, values) in collected.iter_mut() {
                    match output.take(field) {
                        Some(value) => values.push(value),
                        None if *required => {
                            return Err(OperationError::MissingOutput(field.clone()))
                        }
                        None => values.push(Value::Null),
                    }
                }
            }

            Ok(collected
                .into_iter()
                .map(|(field, _, values)| (field, Value::Array(values)))
                .collect::<BTreeMap<_, _>>()
                .into())
        }
    }
}
