//! Validated, executable operation graphs.
//!
//! A [`WorkflowGraph`] is checked once at construction: ids, fields, fan-in,
//! acyclicity and connection types. After that it is immutable and can be
//! shared across any number of concurrent jobs.

use crate::document::{OperationDocument, WorkflowDocument};
use crate::executor::WorkflowExecutor;
use crate::job::Job;
use async_trait::async_trait;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::Arc;
use typeflow_core::{
    Connection, EventBus, ExecutionError, FieldDescriptor, GraphDefinitionError, Operation, OperationContext,
    OperationError, OperationId, OperationInput, OperationOutput, OperationRole, Shape,
    TypeResolver, ValueType, VALUE_FIELD,
};

/// Operations wired together by typed field connections
pub struct WorkflowGraph {
    id: OperationId,
    operations: Vec<Arc<dyn Operation>>,
    index: HashMap<OperationId, usize>,
    connections: Vec<Connection>,
    resolver: Arc<TypeResolver>,
    /// Connection indices targeting each operation
    incoming: Vec<Vec<usize>>,
    /// Distinct upstream operations of each operation
    upstream: Vec<Vec<usize>>,
    /// Distinct downstream operations of each operation
    downstream: Vec<Vec<usize>>,
    /// Operations invoked once per element of a multiplexed input
    multiplexed: Vec<bool>,
    order: Vec<usize>,
    input_shape: Shape,
    output_shape: Shape,
}

impl WorkflowGraph {
    pub const DISCRIMINANT: &'static str = "workflow";

    /// Validates operations and connections with the default conversion rules.
    pub fn new(
        operations: Vec<Arc<dyn Operation>>,
        connections: Vec<Connection>,
    ) -> Result<Self, GraphDefinitionError> {
        Self::builder()
            .operations(operations)
            .connections(connections)
            .build()
    }

    pub fn builder() -> WorkflowGraphBuilder {
        WorkflowGraphBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn resolver(&self) -> &Arc<TypeResolver> {
        &self.resolver
    }

    pub fn operation(&self, id: &str) -> Option<&Arc<dyn Operation>> {
        self.index.get(id).map(|&i| &self.operations[i])
    }

    /// Operation ids in the order a sequential run would execute them.
    pub fn execution_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&i| self.operations[i].id())
            .collect()
    }

    /// The type downstream connections observe for an output field. Outputs of
    /// a multiplexed operation are collected into arrays.
    pub fn effective_output_type(&self, operation: &str, field: &str) -> Option<ValueType> {
        let &i = self.index.get(operation)?;
        self.effective_output_type_at(i, field)
    }

    pub fn is_multiplexed(&self, operation: &str) -> bool {
        self.index
            .get(operation)
            .map(|&i| self.multiplexed[i])
            .unwrap_or(false)
    }

    /// Writes the graph back out as a document.
    pub fn to_document(&self) -> WorkflowDocument {
        WorkflowDocument {
            id: Some(self.id.clone()),
            operations: self
                .operations
                .iter()
                .map(|op| OperationDocument {
                    id: op.id().to_string(),
                    discriminant: op.discriminant().to_string(),
                    fields: op.config(),
                })
                .collect(),
            connections: self.connections.clone(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.operations.len()
    }

    pub(crate) fn operation_at(&self, i: usize) -> &Arc<dyn Operation> {
        &self.operations[i]
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn incoming_at(&self, i: usize) -> impl Iterator<Item = &Connection> + '_ {
        self.incoming[i].iter().map(move |&c| &self.connections[c])
    }

    pub(crate) fn upstream_at(&self, i: usize) -> &[usize] {
        &self.upstream[i]
    }

    pub(crate) fn downstream_at(&self, i: usize) -> &[usize] {
        &self.downstream[i]
    }

    pub(crate) fn is_multiplexed_at(&self, i: usize) -> bool {
        self.multiplexed[i]
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn effective_output_type_at(&self, i: usize, field: &str) -> Option<ValueType> {
        let ty = self.operations[i].output_shape().get(field)?.ty.clone();
        if self.multiplexed[i] {
            Some(ValueType::array(ty))
        } else {
            Some(ty)
        }
    }
}

#[async_trait]
impl Operation for WorkflowGraph {
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

    fn config(&self) -> serde_json::Map<String, serde_json::Value> {
        let document = self.to_document();
        let mut config = serde_json::Map::new();
        config.insert(
            "operations".to_string(),
            serde_json::to_value(&document.operations).unwrap_or_default(),
        );
        config.insert(
            "connections".to_string(),
            serde_json::to_value(&document.connections).unwrap_or_default(),
        );
        config
    }

    async fn perform(
        &self,
        input: OperationInput,
        ctx: &OperationContext,
    ) -> Result<OperationOutput, OperationError> {
        let job = Job::with_cancellation(input.into_values(), ctx.cancellation.child_token());
        let events: EventBus = ctx.events.bus();

        WorkflowExecutor::default()
            .run(self, job, &events)
            .await
            .map(OperationOutput::from)
            .map_err(|err| match err {
                ExecutionError::Cancelled => OperationError::Cancelled,
                other => OperationError::Workflow(Box::new(other)),
            })
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("id", &self.id)
            .field("operations", &self.execution_order())
            .field("connections", &self.connections)
            .finish()
    }
}

/// Collects operations and connections, then validates them into a graph
pub struct WorkflowGraphBuilder {
    id: OperationId,
    operations: Vec<Arc<dyn Operation>>,
    connections: Vec<Connection>,
    resolver: Option<Arc<TypeResolver>>,
}

impl Default for WorkflowGraphBuilder {
    fn default() -> Self {
        Self {
            id: WorkflowGraph::DISCRIMINANT.to_string(),
            operations: Vec::new(),
            connections: Vec::new(),
            resolver: None,
        }
    }
}

impl WorkflowGraphBuilder {
    pub fn id(mut self, id: impl Into<OperationId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn operation(mut self, operation: impl Operation + 'static) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    pub fn operation_arc(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn operations(mut self, operations: impl IntoIterator<Item = Arc<dyn Operation>>) -> Self {
        self.operations.extend(operations);
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn connections(mut self, connections: impl IntoIterator<Item = Connection>) -> Self {
        self.connections.extend(connections);
        self
    }

    pub fn resolver(mut self, resolver: Arc<TypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Result<WorkflowGraph, GraphDefinitionError> {
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(TypeResolver::with_defaults()));
        let operations = self.operations;
        let connections = self.connections;
        let n = operations.len();

        let mut index = HashMap::with_capacity(n);
        for (i, op) in operations.iter().enumerate() {
            if index.insert(op.id().to_string(), i).is_some() {
                return Err(GraphDefinitionError::DuplicateOperation {
                    operation: op.id().to_string(),
                });
            }
        }

        // References and fields
        let mut endpoints = Vec::with_capacity(connections.len());
        let mut field_types = Vec::with_capacity(connections.len());
        for connection in &connections {
            let lookup = |operation: &OperationId| {
                index.get(operation).copied().ok_or_else(|| {
                    GraphDefinitionError::UnknownOperation {
                        connection: connection.to_string(),
                        operation: operation.clone(),
                    }
                })
            };
            let source = lookup(&connection.source.operation)?;
            let target = lookup(&connection.target.operation)?;

            let source_type = operations[source]
                .output_shape()
                .get(&connection.source.field)
                .map(|f| f.ty.clone())
                .ok_or_else(|| GraphDefinitionError::UnknownSourceField {
                    operation: connection.source.operation.clone(),
                    field: connection.source.field.clone(),
                })?;
            let target_type = operations[target]
                .input_shape()
                .get(&connection.target.field)
                .map(|f| f.ty.clone())
                .ok_or_else(|| GraphDefinitionError::UnknownTargetField {
                    operation: connection.target.operation.clone(),
                    field: connection.target.field.clone(),
                })?;
            endpoints.push((source, target));
            field_types.push((source_type, target_type));
        }

        // Fan-in: only multiplexed connections may share a target field
        let mut targets: BTreeMap<(&str, &str), Vec<&Connection>> = BTreeMap::new();
        for connection in &connections {
            targets
                .entry((
                    connection.target.operation.as_str(),
                    connection.target.field.as_str(),
                ))
                .or_default()
                .push(connection);
        }
        for ((operation, field), incoming) in &targets {
            if incoming.len() > 1 && !incoming.iter().all(|c| c.multiplex) {
                return Err(GraphDefinitionError::DuplicateTarget {
                    operation: operation.to_string(),
                    field: field.to_string(),
                });
            }
        }

        // Acyclicity
        let mut dependencies: DiGraph<usize, ()> = DiGraph::with_capacity(n, connections.len());
        for i in 0..n {
            dependencies.add_node(i);
        }
        for &(source, target) in &endpoints {
            dependencies.update_edge(NodeIndex::new(source), NodeIndex::new(target), ());
        }
        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(GraphDefinitionError::Cycle {
                operations: cycle
                    .into_iter()
                    .map(|i| operations[i].id().to_string())
                    .collect(),
            });
        }

        let mut incoming = vec![Vec::new(); n];
        let mut upstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut multiplexed = vec![false; n];
        for (c, (connection, &(source, target))) in connections.iter().zip(&endpoints).enumerate() {
            incoming[target].push(c);
            if !upstream[target].contains(&source) {
                upstream[target].push(source);
            }
            if !downstream[source].contains(&target) {
                downstream[source].push(target);
            }
            if connection.multiplex {
                multiplexed[target] = true;
            }
        }

        // Static type check of every connection
        for ((connection, &(source, _)), (declared, target_type)) in
            connections.iter().zip(&endpoints).zip(field_types)
        {
            let source_type = if multiplexed[source] {
                ValueType::array(declared)
            } else {
                declared
            };

            let carried = if connection.multiplex {
                match &source_type {
                    ValueType::Array(element) => element.as_ref().clone(),
                    ValueType::Any | ValueType::Json => ValueType::Any,
                    other => {
                        return Err(GraphDefinitionError::MultiplexRequiresArray {
                            connection: connection.to_string(),
                            source_type: other.clone(),
                        })
                    }
                }
            } else {
                source_type
            };

            if !resolver.can_convert(&carried, &target_type) {
                return Err(GraphDefinitionError::IncompatibleTypes {
                    connection: connection.to_string(),
                    source_type: carried,
                    target_type,
                });
            }
        }

        // Required inputs must be bound
        for (i, op) in operations.iter().enumerate() {
            if matches!(op.role(), OperationRole::ExternalInput { .. }) {
                continue;
            }
            for field in op.input_shape().iter().filter(|f| f.required) {
                let bound = incoming[i]
                    .iter()
                    .any(|&c| connections[c].target.field == field.name);
                if !bound {
                    return Err(GraphDefinitionError::UnboundInput {
                        operation: op.id().to_string(),
                        field: field.name.clone(),
                    });
                }
            }
        }

        // External shape
        let mut input_shape = Shape::new();
        let mut output_shape = Shape::new();
        for (i, op) in operations.iter().enumerate() {
            let (shape, name, ty) = match op.role() {
                OperationRole::ExternalInput { name } => {
                    let ty = op.output_shape().get(VALUE_FIELD).map(|f| f.ty.clone());
                    (&mut input_shape, name, ty)
                }
                OperationRole::ExternalOutput { name } => {
                    let ty = op.input_shape().get(VALUE_FIELD).map(|f| {
                        if multiplexed[i] {
                            ValueType::array(f.ty.clone())
                        } else {
                            f.ty.clone()
                        }
                    });
                    (&mut output_shape, name, ty)
                }
                OperationRole::Compute => continue,
            };
            let ty = ty.unwrap_or(ValueType::Any);
            if let Some(existing) = shape.get(&name) {
                if existing.ty != ty {
                    return Err(GraphDefinitionError::ConflictingExternalField {
                        name,
                        first: existing.ty.clone(),
                        second: ty,
                    });
                }
                continue;
            }
            shape.insert(FieldDescriptor {
                name,
                ty,
                required: true,
            });
        }

        let order = stable_topological_order(n, &upstream, &downstream);

        tracing::debug!(
            "Validated workflow graph with {} operations and {} connections",
            n,
            connections.len()
        );

        Ok(WorkflowGraph {
            id: self.id,
            operations,
            index,
            connections,
            resolver,
            incoming,
            upstream,
            downstream,
            multiplexed,
            order,
            input_shape,
            output_shape,
        })
    }
}

/// Returns the operations of one cycle, in declaration order.
fn find_cycle(graph: &DiGraph<usize, ()>) -> Option<Vec<usize>> {
    let mut components = tarjan_scc(graph);
    components.sort_by_key(|component| component.iter().map(|n| n.index()).min());
    components
        .into_iter()
        .find(|component| {
            component.len() > 1 || graph.contains_edge(component[0], component[0])
        })
        .map(|component| {
            let mut members: Vec<usize> = component.into_iter().map(|n| graph[n]).collect();
            members.sort_unstable();
            members
        })
}

/// Kahn's algorithm, always releasing the earliest-declared ready operation.
fn stable_topological_order(n: usize, upstream: &[Vec<usize>], downstream: &[Vec<usize>]) -> Vec<usize> {
    let mut pending: Vec<usize> = upstream.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| pending[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &next in &downstream[i] {
            pending[next] -= 1;
            if pending[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    order
}
