use crate::OperationId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One end of a connection: an operation and one of its fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionPoint {
    pub operation: OperationId,
    pub field: String,
}

impl ConnectionPoint {
    pub fn new(operation: impl Into<OperationId>, field: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            field: field.into(),
        }
    }
}

impl fmt::Display for ConnectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.operation, self.field)
    }
}

/// Directed edge carrying an output field value into an input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub source: ConnectionPoint,
    pub target: ConnectionPoint,
    /// Source is a sequence; the target operation runs once per element.
    #[serde(default)]
    pub multiplex: bool,
}

impl Connection {
    pub fn new(
        source_operation: impl Into<OperationId>,
        source_field: impl Into<String>,
        target_operation: impl Into<OperationId>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            source: ConnectionPoint::new(source_operation, source_field),
            target: ConnectionPoint::new(target_operation, target_field),
            multiplex: false,
        }
    }

    pub fn multiplexed(mut self) -> Self {
        self.multiplex = true;
        self
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)?;
        if self.multiplex {
            write!(f, " (multiplex)")?;
        }
        Ok(())
    }
}
