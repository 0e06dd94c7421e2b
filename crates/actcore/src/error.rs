use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    #[error("Scheme error: {0}")]
    Scheme(#[from] SchemeError),

    #[error("Service conflict: {0}")]
    ServiceConflict(String),

    #[error("Missing service: {0}")]
    MissingService(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by activity execution.
///
/// `Interrupted` is not a failure: it is the control signal that unwinds
/// nested composite loops one frame at a time until the level that can
/// resume at the pending interrupt target. It is consumed by exactly one
/// loop and never escapes the instance worker.
#[derive(Error, Debug, Clone)]
pub enum ActivityError {
    #[error("execution interrupted")]
    Interrupted,

    #[error("activity '{activity}' failed: {message}")]
    Failed { activity: String, message: String },

    #[error("checkpoint replay mismatch: log expects '{expected}', got '{actual}'")]
    ReplayMismatch { expected: String, actual: String },

    #[error("unknown activity: {0}")]
    UnknownActivity(String),

    #[error("asynchronous event handling is not supported")]
    AsyncHandlingUnsupported,
}

impl ActivityError {
    pub fn failed(activity: impl Into<String>, message: impl ToString) -> Self {
        ActivityError::Failed {
            activity: activity.into(),
            message: message.to_string(),
        }
    }

    /// True for the preemption control signal, false for real failures.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, ActivityError::Interrupted)
    }
}

#[derive(Error, Debug)]
pub enum SchemeError {
    #[error("duplicate activity name: {0}")]
    DuplicateActivity(String),

    #[error("unknown activity referenced: {0}")]
    UnknownActivity(String),

    #[error("activity '{child}' declared under missing parent '{parent}'")]
    MissingParent { parent: String, child: String },

    #[error("scheme has no root activity")]
    MissingRoot,

    #[error("invalid activity name: {0}")]
    InvalidName(String),
}
