use actcore::{
    effective_parameters, Activity, ActivityError, ActivityKind, ActivityScope, HandlingMode,
    NextActivityKey, Value, WorkflowExecutionContext,
};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

/// Name under which a composite's entry-point override travels as a
/// parameter.
pub const START_ACTIVITY_PARAMETER: &str = "start_activity";

/// Drives activities against one execution context.
///
/// The same sequencing loop serves both the instance worker (starting at the
/// scheme root with an empty stack) and every nested composite; the only
/// difference is what the stack-readiness check sees when an interrupt
/// unwinds through it.
pub struct ActivityExecutor {
    context: Arc<WorkflowExecutionContext>,
}

impl ActivityExecutor {
    pub fn new(context: Arc<WorkflowExecutionContext>) -> Self {
        Self { context }
    }

    /// Worker entry point: run the scheme root to completion.
    pub async fn run_to_completion(&self) -> Result<NextActivityKey, ActivityError> {
        let root = self.context.scheme().root();
        self.run_sequence(root).await
    }

    /// Execute activities starting at `current`, following the transition
    /// tables, until a return activity or the end of the chain.
    ///
    /// An `Interrupted` signal from a step is resolved here if the execution
    /// stack is ready for the pending target; otherwise it propagates one
    /// level further out, unwinding one composite frame at a time.
    async fn run_sequence(
        &self,
        mut current: Arc<Activity>,
    ) -> Result<NextActivityKey, ActivityError> {
        loop {
            // A return activity at the head of a step exits the enclosing
            // scope immediately; it never runs through the callback path.
            if let Some(result) = current.return_result() {
                return Ok(result.clone());
            }
            match self.execute(current.clone(), HashMap::new()).await {
                Ok(key) => match self.next_activity(&current, &key)? {
                    Some(next) => current = next,
                    None => return Ok(self.context.scheme().default_result.clone()),
                },
                Err(ActivityError::Interrupted) => match self.context.resume_target() {
                    Some(target) => current = target,
                    None => return Err(ActivityError::Interrupted),
                },
                Err(err) => return Err(err),
            }
        }
    }

    /// Execute one activity with caller parameter overrides.
    ///
    /// Wraps the kind-specific work in the context's entering/leaving
    /// bookkeeping; the bookkeeping for this call is complete before any
    /// error, including the interrupt signal, propagates to the caller.
    pub fn execute(
        &self,
        activity: Arc<Activity>,
        overrides: HashMap<String, Value>,
    ) -> BoxFuture<'_, Result<NextActivityKey, ActivityError>> {
        Box::pin(async move {
            let result = match self.context.enter(&activity) {
                Ok(()) => self.invoke(&activity, overrides).await,
                Err(err) => Err(err),
            };
            self.context.leave(&activity);
            result
        })
    }

    async fn invoke(
        &self,
        activity: &Arc<Activity>,
        overrides: HashMap<String, Value>,
    ) -> Result<NextActivityKey, ActivityError> {
        if self.context.begin_initialize(&activity.name) {
            if let Some(handler) = &activity.handler {
                handler
                    .initialize()
                    .await
                    .map_err(|e| wrap(&activity.name, e))?;
            }
        }

        let parameters =
            effective_parameters(&activity.parameters, &overrides, self.context.as_ref());
        let default = self.context.scheme().default_result.clone();

        match &activity.kind {
            ActivityKind::Task => match &activity.handler {
                Some(handler) => {
                    let scope = ActivityScope {
                        activity: activity.clone(),
                        context: self.context.clone(),
                        parameters,
                    };
                    handler
                        .execute(scope)
                        .await
                        .map_err(|e| wrap(&activity.name, e))
                }
                None => Ok(default),
            },
            ActivityKind::Composite { children } => {
                self.run_composite(activity, children, parameters).await
            }
            ActivityKind::Reference { target } => {
                // Full pass-through: the reference contributes only its own
                // entering/leaving bookkeeping and its parameter set.
                let target = self.context.scheme().require(target)?;
                self.execute(target, parameters).await
            }
            ActivityKind::Return { result } => Ok(result.clone()),
            ActivityKind::SubscribeToEvent { event, handler, mode } => {
                if *mode == HandlingMode::Async {
                    return Err(wrap(&activity.name, ActivityError::AsyncHandlingUnsupported));
                }
                self.context.subscribe_event(&event.event, handler);
                tracing::debug!(event = %event.event, handler, "event handler subscribed");
                Ok(default)
            }
            ActivityKind::UnsubscribeFromEvent { event, handler } => {
                self.context.unsubscribe_event(&event.event, handler);
                tracing::debug!(event = %event.event, handler, "event handler unsubscribed");
                Ok(default)
            }
            ActivityKind::MonitorEnter { lock } => {
                self.context.monitor_enter(lock);
                Ok(default)
            }
            ActivityKind::MonitorExit { lock } => {
                self.context.monitor_exit(lock);
                Ok(default)
            }
        }
    }

    /// Composite body: apply reconfiguration parameters, pick the start
    /// child, then sequence children through the shared loop.
    async fn run_composite(
        &self,
        composite: &Arc<Activity>,
        children: &[String],
        parameters: HashMap<String, Value>,
    ) -> Result<NextActivityKey, ActivityError> {
        self.apply_configuration(composite, parameters);

        let Some(start) = self.select_start_child(composite, children)? else {
            return Ok(self.context.scheme().default_result.clone());
        };
        self.run_sequence(start).await
    }

    /// Parameters naming one of the composite's declared properties
    /// reconfigure it (coerced to the declared type); `start_activity`
    /// overrides the entry point for this invocation.
    fn apply_configuration(&self, composite: &Arc<Activity>, parameters: HashMap<String, Value>) {
        for (name, value) in parameters {
            if name == START_ACTIVITY_PARAMETER {
                if let Some(child) = value.as_str() {
                    self.context.set_start_override(&composite.name, child);
                } else {
                    tracing::warn!(
                        composite = %composite.name,
                        "start_activity parameter must be a string"
                    );
                }
            } else if let Some(declared) = composite.properties.get(&name) {
                match value.coerce_like(declared) {
                    Some(coerced) => {
                        self.context
                            .set_property_override(&composite.name, &name, coerced);
                    }
                    None => tracing::warn!(
                        composite = %composite.name,
                        property = %name,
                        "parameter value cannot be coerced to the declared property type"
                    ),
                }
            }
        }
    }

    fn select_start_child(
        &self,
        composite: &Arc<Activity>,
        children: &[String],
    ) -> Result<Option<Arc<Activity>>, ActivityError> {
        let scheme = self.context.scheme();

        // Explicit override wins; it is given as the child's local name.
        if let Some(local) = self.context.start_override(&composite.name) {
            let full = format!("{}.{}", composite.name, local);
            let name = children
                .iter()
                .find(|c| **c == full || **c == local)
                .ok_or_else(|| ActivityError::UnknownActivity(full))?;
            return scheme.require(name).map(Some);
        }

        // On replay, continue down the recorded path when it runs through
        // this composite; untracked subtrees re-execute from the beginning.
        if let Some(expected) = self.context.replay_expected() {
            if let Some(name) = children.iter().find(|c| **c == expected) {
                return scheme.require(name).map(Some);
            }
        }

        match children.first() {
            Some(first) => scheme.require(first).map(Some),
            None => Ok(None),
        }
    }

    /// Tie-break order for the proposed result key: exact transition match,
    /// then the `Default` transition, then the structural `following`
    /// pointer, then nothing.
    pub fn next_activity(
        &self,
        current: &Activity,
        key: &NextActivityKey,
    ) -> Result<Option<Arc<Activity>>, ActivityError> {
        let scheme = self.context.scheme();
        let name = current
            .transitions
            .get(key)
            .or_else(|| current.transitions.get(&NextActivityKey::default()))
            .or(current.following.as_ref());
        match name {
            Some(name) => scheme.require(name).map(Some),
            None => Ok(None),
        }
    }
}

/// Wrap a handler failure with the offending activity; the control signal
/// and replay divergence pass through untouched.
fn wrap(activity: &str, err: ActivityError) -> ActivityError {
    match err {
        ActivityError::Interrupted
        | ActivityError::ReplayMismatch { .. }
        | ActivityError::Failed { .. } => err,
        other => ActivityError::failed(activity, other),
    }
}
