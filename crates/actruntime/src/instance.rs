use crate::executor::ActivityExecutor;
use actcore::{
    ActivityError, EngineError, EngineEventBus, Priority, WorkflowExecutionContext, WorkflowId,
    WorkflowScheme,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One running workflow: an identity, an execution context, and a single
/// worker task driving the scheme root to completion.
///
/// Activities within an instance run strictly sequentially on the worker;
/// redirection requests arrive from any task and are serialized through the
/// context's interrupt dispatcher.
pub struct WorkflowInstance {
    id: WorkflowId,
    scheme: Arc<WorkflowScheme>,
    context: Arc<WorkflowExecutionContext>,
    events: Arc<EngineEventBus>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkflowInstance {
    pub(crate) fn new(
        id: WorkflowId,
        scheme: Arc<WorkflowScheme>,
        context: Arc<WorkflowExecutionContext>,
        events: Arc<EngineEventBus>,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            scheme,
            context,
            events,
            cancel,
            worker: Mutex::new(None),
        })
    }

    pub fn id(&self) -> WorkflowId {
        self.id
    }

    pub fn scheme(&self) -> &Arc<WorkflowScheme> {
        &self.scheme
    }

    pub fn context(&self) -> &Arc<WorkflowExecutionContext> {
        &self.context
    }

    /// Launch the worker and the interrupt dispatcher. Starting an already
    /// started instance is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            tracing::warn!(workflow_id = %self.id, "instance already started");
            return;
        }

        let dispatcher_ctx = self.context.clone();
        let dispatcher_cancel = self.cancel.child_token();
        tokio::spawn(async move {
            dispatcher_ctx.run_interrupt_dispatcher(dispatcher_cancel).await;
        });

        let instance = self.clone();
        *worker = Some(tokio::spawn(async move {
            instance.run_worker().await;
        }));
    }

    async fn run_worker(&self) {
        tracing::info!(workflow_id = %self.id, scheme = %self.scheme.name, "workflow started");
        self.events.started(self.id);

        let executor = ActivityExecutor::new(self.context.clone());
        let result = executor.run_to_completion().await;

        self.uninitialize_all().await;

        match result {
            Ok(result) => {
                tracing::info!(workflow_id = %self.id, %result, "workflow completed");
                self.events.completed(self.id, result);
            }
            Err(ActivityError::Interrupted) => {
                // Every interrupt is resolved by a sequence loop before the
                // worker returns; seeing one here means the pending target
                // vanished mid-unwind.
                tracing::error!(workflow_id = %self.id, "interrupt signal escaped the worker");
                self.events.terminated(
                    self.id,
                    "Interrupt left unresolved",
                    &ActivityError::Interrupted.to_string(),
                );
            }
            Err(err @ ActivityError::ReplayMismatch { .. }) => {
                tracing::error!(workflow_id = %self.id, error = %err, "checkpoint replay diverged");
                self.events
                    .terminated(self.id, "Checkpoint replay mismatch", &err.to_string());
            }
            Err(err) => {
                tracing::error!(workflow_id = %self.id, error = %err, "workflow terminated");
                self.events
                    .terminated(self.id, "Activity execution failed", &err.to_string());
            }
        }

        // The dispatcher has nothing left to serve.
        self.cancel.cancel();
    }

    /// Uninitialize every activity that was initialized, once each, in
    /// initialization order.
    async fn uninitialize_all(&self) {
        for name in self.context.initialized_activities() {
            let Some(activity) = self.scheme.get(&name) else {
                continue;
            };
            if let Some(handler) = &activity.handler {
                if let Err(err) = handler.uninitialize().await {
                    tracing::warn!(workflow_id = %self.id, activity = %name, error = %err,
                        "uninitialize failed");
                }
            }
        }
    }

    /// Request redirection of execution to the named activity at that
    /// activity's own priority.
    pub fn go_to_activity(&self, activity: &str) -> Result<(), EngineError> {
        let target = self.scheme.require(activity)?;
        self.context.toggle_execution_to(&target, target.priority);
        Ok(())
    }

    /// Cancel the instance: redirect to the scheme's exit activity at
    /// maximum priority. Cancellation reuses the preemption machinery, so
    /// the workflow completes (with the exit result) rather than aborting.
    pub fn stop(&self) {
        let exit = self.scheme.exit();
        self.context.toggle_execution_to(&exit, Priority::HIGHEST);
    }

    /// Fire a native event: every handler registered for it is driven
    /// through the preemption path. Returns the number of handlers fired.
    pub fn fire_event(&self, event: &str) -> usize {
        let handlers = self.context.event_handlers(event);
        let count = handlers.len();
        for handler in handlers {
            if let Err(err) = self.go_to_activity(&handler) {
                tracing::warn!(workflow_id = %self.id, event, handler = %handler, error = %err,
                    "event handler not redirectable");
            }
        }
        count
    }

    /// Wait for the worker to finish. Returns immediately if the instance
    /// was never started.
    pub async fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::error!(workflow_id = %self.id, error = %err, "worker task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}
