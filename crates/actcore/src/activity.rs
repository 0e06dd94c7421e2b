use crate::context::WorkflowExecutionContext;
use crate::{ActivityError, ActivityParameter, NextActivityKey, Priority, Value};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named node in the workflow graph.
///
/// Names are hierarchical dot-separated paths (`Root.Child.Grandchild`);
/// the parent back-reference and all graph edges are stored as names and
/// resolved against the scheme's flat activity map.
pub struct Activity {
    pub name: String,
    pub priority: Priority,
    /// Whether visits to this activity are recorded in the durable
    /// checkpoint log.
    pub tracking: bool,
    pub parent: Option<String>,
    /// Transition table: result key -> target activity name.
    pub transitions: HashMap<NextActivityKey, String>,
    /// Structural "next sibling" fallback when no transition matches.
    pub following: Option<String>,
    pub parameters: Vec<ActivityParameter>,
    /// Declared configuration properties, readable through parameter
    /// property references and overridable on composites.
    pub properties: HashMap<String, Value>,
    pub kind: ActivityKind,
    pub handler: Option<Arc<dyn ActivityHandler>>,
}

impl Activity {
    /// Last segment of the dotted path.
    pub fn local_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.kind, ActivityKind::Composite { .. })
    }

    pub fn return_result(&self) -> Option<&NextActivityKey> {
        match &self.kind {
            ActivityKind::Return { result } => Some(result),
            _ => None,
        }
    }
}

impl fmt::Debug for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Activity")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("tracking", &self.tracking)
            .field("kind", &self.kind)
            .field("transitions", &self.transitions)
            .field("following", &self.following)
            .finish_non_exhaustive()
    }
}

/// The execution variants of the activity family.
#[derive(Debug, Clone)]
pub enum ActivityKind {
    /// Plain activity executed through its bound handler.
    Task,
    /// Owns an ordered set of children and sequences them through the
    /// transition table.
    Composite { children: Vec<String> },
    /// Forwards execution to another activity unchanged (call by reference).
    Reference { target: String },
    /// Terminal node: exits the enclosing composite with a fixed result,
    /// never executed through the normal callback path.
    Return { result: NextActivityKey },
    /// Registers `handler` for the native event, then yields the scheme
    /// default result.
    SubscribeToEvent {
        event: EventHolder,
        handler: String,
        mode: HandlingMode,
    },
    /// Removes `handler` from the native event registration.
    UnsubscribeFromEvent { event: EventHolder, handler: String },
    /// Extension point, see `WorkflowExecutionContext::monitor_enter`.
    MonitorEnter { lock: String },
    MonitorExit { lock: String },
}

/// A native event paired with the activity that owns the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHolder {
    pub event: String,
    pub owner: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlingMode {
    /// Single synchronous handler per event.
    Sync,
    /// Fan-out dispatch; not implemented.
    Async,
}

/// Everything a handler sees for one execution: the activity, the shared
/// execution context, and the effective parameter set.
#[derive(Clone)]
pub struct ActivityScope {
    pub activity: Arc<Activity>,
    pub context: Arc<WorkflowExecutionContext>,
    pub parameters: HashMap<String, Value>,
}

impl ActivityScope {
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// The scheme-level default result, the usual return value of handlers
    /// that do not branch.
    pub fn default_key(&self) -> NextActivityKey {
        self.context.scheme().default_result.clone()
    }
}

/// Callback bindings of an activity.
///
/// `initialize` and `uninitialize` run at most once per activity per
/// instance; the engine guards the idempotence, implementations need not.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn execute(&self, scope: ActivityScope) -> Result<NextActivityKey, ActivityError>;

    async fn initialize(&self) -> Result<(), ActivityError> {
        Ok(())
    }

    async fn uninitialize(&self) -> Result<(), ActivityError> {
        Ok(())
    }
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> ActivityHandler for FnHandler<F>
where
    F: Fn(ActivityScope) -> BoxFuture<'static, Result<NextActivityKey, ActivityError>>
        + Send
        + Sync,
{
    async fn execute(&self, scope: ActivityScope) -> Result<NextActivityKey, ActivityError> {
        (self.f)(scope).await
    }
}

/// Wrap an async closure as an [`ActivityHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ActivityHandler>
where
    F: Fn(ActivityScope) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<NextActivityKey, ActivityError>> + Send + 'static,
{
    Arc::new(FnHandler {
        f: move |scope| Box::pin(f(scope)) as BoxFuture<'static, _>,
    })
}
