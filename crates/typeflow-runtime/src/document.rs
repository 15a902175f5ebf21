//! Workflow documents: the serialized form of a graph.
//!
//! ```json
//! {
//!   "operations": [
//!     { "id": "1", "discriminant": "workflowInput", "name": "foo", "type": "integer" },
//!     { "id": "2", "discriminant": "workflowOutput", "name": "bar", "type": "integer" }
//!   ],
//!   "connections": [
//!     { "source": { "operation": "1", "field": "Value" },
//!       "target": { "operation": "2", "field": "Value" } }
//!   ]
//! }
//! ```

use crate::graph::WorkflowGraph;
use crate::registry::OperationRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use typeflow_core::{Connection, DocumentError, FlowError, Operation, OperationId, TypeResolver};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub operations: Vec<OperationDocument>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

/// One operation: its id, its discriminant and its variant-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationDocument {
    pub id: OperationId,
    pub discriminant: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowDocument {
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolves every discriminant through `registry` and validates the result.
    pub fn build(
        &self,
        registry: &OperationRegistry,
        resolver: Arc<TypeResolver>,
    ) -> Result<WorkflowGraph, DocumentError> {
        let operations = self
            .operations
            .iter()
            .map(|doc| build_operation(doc, registry, &resolver))
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = WorkflowGraph::builder()
            .operations(operations)
            .connections(self.connections.iter().cloned())
            .resolver(resolver);
        if let Some(id) = &self.id {
            builder = builder.id(id.clone());
        }
        Ok(builder.build()?)
    }
}

fn build_operation(
    doc: &OperationDocument,
    registry: &OperationRegistry,
    resolver: &Arc<TypeResolver>,
) -> Result<Arc<dyn Operation>, DocumentError> {
    // Nested graphs need the registry itself, so they are not a registry entry.
    if doc.discriminant == WorkflowGraph::DISCRIMINANT && !registry.contains(&doc.discriminant) {
        let mut nested: WorkflowDocument =
            serde_json::from_value(serde_json::Value::Object(doc.fields.clone()))?;
        nested.id = Some(doc.id.clone());
        tracing::debug!("Building nested workflow '{}'", doc.id);
        return Ok(Arc::new(nested.build(registry, resolver.clone())?));
    }

    let mut fields = doc.fields.clone();
    fields.insert("id".to_string(), serde_json::Value::String(doc.id.clone()));
    Ok(registry.create(&doc.discriminant, serde_json::Value::Object(fields))?)
}
