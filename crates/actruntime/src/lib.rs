//! Instance and runtime layer of the workflow engine.
//!
//! Builds on `actcore`: the executor drives activities through their
//! transition tables and resolves preemption, `WorkflowInstance` owns one
//! worker task per running workflow, and `WorkflowRuntime` holds the scheme
//! and instance registries plus the persistence and scheme-loader service
//! slots.

mod bridge;
mod executor;
mod instance;
mod persistence;
mod runtime;

pub use bridge::EventBinding;
pub use executor::{ActivityExecutor, START_ACTIVITY_PARAMETER};
pub use instance::WorkflowInstance;
pub use persistence::{FilePersistence, InMemoryPersistence, PersistenceProvider, SchemeLoader};
pub use runtime::WorkflowRuntime;
