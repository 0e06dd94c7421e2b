//! Core model and execution contract of the workflow engine.
//!
//! This crate holds the immutable activity graph (`Activity`,
//! `WorkflowScheme`), the handler contract activities are bound to, and the
//! per-instance `WorkflowExecutionContext` that implements priority-gated
//! preemption, the durable checkpoint log with restore/replay, and the
//! interrupt-aware blocking surface. Driving a whole instance lives in the
//! `actruntime` crate.

mod activity;
mod context;
mod error;
pub mod events;
mod key;
mod params;
mod scheme;
mod value;

pub use activity::{
    handler_fn, Activity, ActivityHandler, ActivityKind, ActivityScope, EventHolder, HandlingMode,
};
pub use context::{ContextSnapshot, WaitHandle, WaitOutcome, WorkflowExecutionContext};
pub use error::{ActivityError, EngineError, SchemeError};
pub use events::{EngineEvent, EngineEventBus, WorkflowId};
pub use key::{NextActivityKey, Priority, DEFAULT_KEY_NAME};
pub use params::{effective_parameters, ActivityParameter, ParameterEvaluator, PropertySource};
pub use scheme::{ActivityDecl, SchemeBuilder, WorkflowScheme, EXIT_ACTIVITY};
pub use value::Value;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
