use crate::instance::WorkflowInstance;
use crate::persistence::{InMemoryPersistence, PersistenceProvider, SchemeLoader};
use actcore::{
    ActivityKind, ContextSnapshot, EngineError, EngineEvent, EngineEventBus,
    WorkflowExecutionContext, WorkflowId, WorkflowScheme, EXIT_ACTIVITY,
};
use parking_lot::Mutex;
use petgraph::graph::DiGraph;
use petgraph::visit::Dfs;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Owns running instances, their shared schemes, and the service slots the
/// engine consumes: at most one scheme loader, at most one persistence
/// provider, and any number of host services looked up by type.
pub struct WorkflowRuntime {
    events: Arc<EngineEventBus>,
    schemes: Mutex<HashMap<String, Arc<WorkflowScheme>>>,
    instances: Mutex<HashMap<WorkflowId, Arc<WorkflowInstance>>>,
    scheme_loader: Mutex<Option<Arc<dyn SchemeLoader>>>,
    persistence: Mutex<Option<Arc<dyn PersistenceProvider>>>,
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    started: AtomicBool,
    cancel: CancellationToken,
}

impl WorkflowRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Arc::new(EngineEventBus::new(256)),
            schemes: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            scheme_loader: Mutex::new(None),
            persistence: Mutex::new(None),
            services: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Wire default services where the host registered none and mark the
    /// runtime started.
    pub fn start_runtime(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut persistence = self.persistence.lock();
        if persistence.is_none() {
            tracing::info!("no persistence service registered; using in-memory snapshots");
            *persistence = Some(Arc::new(InMemoryPersistence::new()));
        }
    }

    /// Stop every owned instance (through the exit-activity interrupt) and
    /// wait for their workers to finish.
    pub async fn stop_runtime(&self) {
        let instances: Vec<_> = self.instances.lock().values().cloned().collect();
        for instance in &instances {
            instance.stop();
        }
        for instance in &instances {
            instance.join().await;
        }
        self.cancel.cancel();
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn set_scheme_loader(&self, loader: Arc<dyn SchemeLoader>) -> Result<(), EngineError> {
        let mut slot = self.scheme_loader.lock();
        if slot.is_some() {
            return Err(EngineError::ServiceConflict(
                "a scheme loader is already registered".to_string(),
            ));
        }
        *slot = Some(loader);
        Ok(())
    }

    pub fn set_persistence(&self, provider: Arc<dyn PersistenceProvider>) -> Result<(), EngineError> {
        let mut slot = self.persistence.lock();
        if slot.is_some() {
            return Err(EngineError::ServiceConflict(
                "a persistence service is already registered".to_string(),
            ));
        }
        *slot = Some(provider);
        Ok(())
    }

    pub fn persistence(&self) -> Option<Arc<dyn PersistenceProvider>> {
        self.persistence.lock().clone()
    }

    pub fn add_service<T: Any + Send + Sync>(&self, service: Arc<T>) {
        self.services.lock().insert(TypeId::of::<T>(), service);
    }

    pub fn get_service<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .lock()
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|s| s.downcast::<T>().ok())
    }

    /// Make a scheme restorable by name.
    pub fn register_scheme(&self, scheme: Arc<WorkflowScheme>) {
        self.schemes.lock().insert(scheme.name.clone(), scheme);
    }

    pub fn instance(&self, workflow_id: WorkflowId) -> Option<Arc<WorkflowInstance>> {
        self.instances.lock().get(&workflow_id).cloned()
    }

    /// Create a fresh instance of `scheme` under `workflow_id`.
    pub fn create_workflow(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        scheme: Arc<WorkflowScheme>,
    ) -> Result<Arc<WorkflowInstance>, EngineError> {
        let context = WorkflowExecutionContext::new(scheme.clone());
        self.wire_instance(workflow_id, scheme, context)
    }

    /// Create an instance from a scheme source resolved through the
    /// registered scheme loader.
    pub async fn create_workflow_from_source(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        source: &str,
    ) -> Result<Arc<WorkflowInstance>, EngineError> {
        let loader = self.scheme_loader.lock().clone().ok_or_else(|| {
            EngineError::MissingService("scheme loader".to_string())
        })?;
        let scheme = loader.load(source).await?;
        self.create_workflow(workflow_id, scheme)
    }

    /// Restore an instance from its last persisted snapshot. The restored
    /// context starts in replay mode when the snapshot's tracking stack is
    /// non-empty.
    pub async fn restore_workflow(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
    ) -> Result<Arc<WorkflowInstance>, EngineError> {
        let persistence = self.persistence().ok_or_else(|| {
            EngineError::MissingService("persistence".to_string())
        })?;
        let snapshot = persistence
            .load(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;
        self.restore_from_snapshot(workflow_id, snapshot).await
    }

    /// Restore when a snapshot exists, otherwise create a fresh instance of
    /// `scheme`.
    pub async fn restore_or_create_workflow(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        scheme: Arc<WorkflowScheme>,
    ) -> Result<Arc<WorkflowInstance>, EngineError> {
        if let Some(persistence) = self.persistence() {
            if let Some(snapshot) = persistence.load(workflow_id).await? {
                return self.restore_from_snapshot(workflow_id, snapshot).await;
            }
        }
        self.create_workflow(workflow_id, scheme)
    }

    async fn restore_from_snapshot(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        snapshot: ContextSnapshot,
    ) -> Result<Arc<WorkflowInstance>, EngineError> {
        let scheme = match self.schemes.lock().get(&snapshot.scheme).cloned() {
            Some(scheme) => scheme,
            None => {
                let loader = self.scheme_loader.lock().clone().ok_or_else(|| {
                    EngineError::MissingService(format!(
                        "scheme '{}' is not registered and no scheme loader is available",
                        snapshot.scheme
                    ))
                })?;
                loader.load(&snapshot.scheme).await?
            }
        };
        tracing::info!(
            %workflow_id,
            scheme = %snapshot.scheme,
            checkpoint_depth = snapshot.tracking_stack.len(),
            "restoring workflow from snapshot"
        );
        let context = WorkflowExecutionContext::restore(scheme.clone(), snapshot);
        self.wire_instance(workflow_id, scheme, context)
    }

    fn wire_instance(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        scheme: Arc<WorkflowScheme>,
        context: Arc<WorkflowExecutionContext>,
    ) -> Result<Arc<WorkflowInstance>, EngineError> {
        {
            let instances = self.instances.lock();
            if instances.contains_key(&workflow_id) {
                return Err(EngineError::ServiceConflict(format!(
                    "workflow {workflow_id} already exists"
                )));
            }
        }
        self.register_scheme(scheme.clone());
        scheme_diagnostics(&scheme);

        let instance = WorkflowInstance::new(
            workflow_id,
            scheme.clone(),
            context.clone(),
            self.events.clone(),
            self.cancel.child_token(),
        );

        self.spawn_persistence_pump(workflow_id, &context);

        self.instances.lock().insert(workflow_id, instance.clone());
        self.events.created(workflow_id, &scheme.name);
        Ok(instance)
    }

    /// Route every checkpoint change of the context to the persistence
    /// service's save and surface it as an observability event.
    fn spawn_persistence_pump(
        self: &Arc<Self>,
        workflow_id: WorkflowId,
        context: &Arc<WorkflowExecutionContext>,
    ) {
        let mut changes = context.subscribe_changes();
        let runtime = Arc::downgrade(self);
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            loop {
                let snapshot = tokio::select! {
                    _ = cancel.cancelled() => return,
                    received = changes.recv() => match received {
                        Ok(snapshot) => snapshot,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(%workflow_id, missed, "checkpoint notifications lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                };
                let Some(runtime) = runtime.upgrade() else { return };
                if let Some(persistence) = runtime.persistence() {
                    if let Err(err) = persistence.save(workflow_id, &snapshot).await {
                        tracing::warn!(%workflow_id, error = %err, "snapshot save failed");
                    }
                }
                runtime
                    .events
                    .context_changed(workflow_id, snapshot.tracking_stack.len());
            }
        });
    }
}

/// Authoring diagnostics run once per created instance: a transition table
/// whose every key points at the same target, and activities unreachable
/// from the root.
fn scheme_diagnostics(scheme: &WorkflowScheme) {
    for activity in scheme.activities() {
        if activity.transitions.len() > 1 {
            let mut targets = activity.transitions.values();
            let first = targets.next();
            if let Some(first) = first {
                if targets.all(|t| t == first) {
                    tracing::warn!(
                        activity = %activity.name,
                        target = %first,
                        "every transition key points at the same target; likely an authoring mistake"
                    );
                }
            }
        }
    }

    let mut graph = DiGraph::<&str, ()>::new();
    let mut index = HashMap::new();
    for activity in scheme.activities() {
        index.insert(activity.name.as_str(), graph.add_node(activity.name.as_str()));
    }
    let mut edges = Vec::new();
    for activity in scheme.activities() {
        let from = index[activity.name.as_str()];
        let mut connect = |to: &str| {
            if let Some(target) = index.get(to) {
                edges.push((from, *target));
            }
        };
        for target in activity.transitions.values() {
            connect(target);
        }
        if let Some(following) = &activity.following {
            connect(following);
        }
        match &activity.kind {
            ActivityKind::Composite { children } => children.iter().for_each(|c| connect(c)),
            ActivityKind::Reference { target } => connect(target),
            ActivityKind::SubscribeToEvent { handler, .. }
            | ActivityKind::UnsubscribeFromEvent { handler, .. } => connect(handler),
            _ => {}
        }
    }
    for (from, to) in edges {
        graph.add_edge(from, to, ());
    }

    let mut reached = HashSet::new();
    let mut dfs = Dfs::new(&graph, index[scheme.root_activity.as_str()]);
    while let Some(node) = dfs.next(&graph) {
        reached.insert(node);
    }
    for activity in scheme.activities() {
        let node = index[activity.name.as_str()];
        if !reached.contains(&node) && activity.name != EXIT_ACTIVITY {
            tracing::warn!(
                activity = %activity.name,
                "activity is unreachable from the root; only an explicit redirection can run it"
            );
        }
    }
}
