use crate::OperationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type JobId = Uuid;

/// Events emitted while a job executes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    JobStarted {
        job_id: JobId,
        operations: usize,
        timestamp: DateTime<Utc>,
    },
    JobCompleted {
        job_id: JobId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    OperationStarted {
        job_id: JobId,
        operation_id: OperationId,
        discriminant: String,
        timestamp: DateTime<Utc>,
    },
    OperationCompleted {
        job_id: JobId,
        operation_id: OperationId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    OperationFailed {
        job_id: JobId,
        operation_id: OperationId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    OperationEvent {
        job_id: JobId,
        operation_id: OperationId,
        event: OperationEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events an operation reports about itself
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum OperationEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Event emitter for operations to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    job_id: JobId,
    operation_id: OperationId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        job_id: JobId,
        operation_id: OperationId,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            job_id,
            operation_id,
            sender,
        }
    }

    /// Emitter whose events go nowhere.
    pub fn disconnected(operation_id: OperationId) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(Uuid::nil(), operation_id, sender)
    }

    /// The bus this emitter publishes to, for operations that run jobs of their own.
    pub fn bus(&self) -> EventBus {
        EventBus {
            sender: self.sender.clone(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Emit an operation-specific event
    pub fn emit(&self, event: OperationEvent) {
        let _ = self.sender.send(ExecutionEvent::OperationEvent {
            job_id: self.job_id,
            operation_id: self.operation_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(OperationEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(OperationEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(OperationEvent::Progress { percent, message });
    }
}

/// Broadcast bus shared by every job of a runtime
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    /// A bus retaining up to `capacity` undelivered events; zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, job_id: JobId, operation_id: OperationId) -> EventEmitter {
        EventEmitter::new(job_id, operation_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
