use crate::NextActivityKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub type WorkflowId = Uuid;

/// Lifecycle events emitted by the runtime for every owned instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    WorkflowCreated {
        workflow_id: WorkflowId,
        scheme: String,
        timestamp: DateTime<Utc>,
    },
    WorkflowStarted {
        workflow_id: WorkflowId,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        workflow_id: WorkflowId,
        result: NextActivityKey,
        timestamp: DateTime<Utc>,
    },
    WorkflowTerminated {
        workflow_id: WorkflowId,
        reason: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The durable tracking stack changed; the new checkpoint depth is
    /// reported for observability. Persistence hooks run off the context's
    /// own change channel, not this event.
    ContextChanged {
        workflow_id: WorkflowId,
        checkpoint_depth: usize,
        timestamp: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            EngineEvent::WorkflowCreated { workflow_id, .. }
            | EngineEvent::WorkflowStarted { workflow_id, .. }
            | EngineEvent::WorkflowCompleted { workflow_id, .. }
            | EngineEvent::WorkflowTerminated { workflow_id, .. }
            | EngineEvent::ContextChanged { workflow_id, .. } => *workflow_id,
        }
    }
}

/// Broadcast bus for lifecycle events.
pub struct EngineEventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EngineEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    pub fn created(&self, workflow_id: WorkflowId, scheme: &str) {
        self.emit(EngineEvent::WorkflowCreated {
            workflow_id,
            scheme: scheme.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn started(&self, workflow_id: WorkflowId) {
        self.emit(EngineEvent::WorkflowStarted {
            workflow_id,
            timestamp: Utc::now(),
        });
    }

    pub fn completed(&self, workflow_id: WorkflowId, result: NextActivityKey) {
        self.emit(EngineEvent::WorkflowCompleted {
            workflow_id,
            result,
            timestamp: Utc::now(),
        });
    }

    pub fn terminated(&self, workflow_id: WorkflowId, reason: &str, error: &str) {
        self.emit(EngineEvent::WorkflowTerminated {
            workflow_id,
            reason: reason.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn context_changed(&self, workflow_id: WorkflowId, checkpoint_depth: usize) {
        self.emit(EngineEvent::ContextChanged {
            workflow_id,
            checkpoint_depth,
            timestamp: Utc::now(),
        });
    }
}
