use crate::params::PropertySource;
use crate::{Activity, ActivityError, Priority, Value, WorkflowScheme};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

/// The persisted execution state: exactly the scheme reference, the durable
/// tracking stack, and the event-handler registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnapshot {
    pub scheme: String,
    pub tracking_stack: Vec<String>,
    pub event_handlers: HashMap<String, Vec<String>>,
}

/// One frame of the execution stack. Entering an activity narrows the
/// context's tracking eligibility and priority; the frame remembers the
/// values to restore when the activity leaves.
#[derive(Debug, Clone)]
struct Frame {
    name: String,
    saved_tracking: bool,
    saved_priority: Priority,
}

#[derive(Debug, Default)]
struct ActivityState {
    initialized: bool,
    start_override: Option<String>,
    property_overrides: HashMap<String, Value>,
}

struct ContextState {
    execution_stack: Vec<Frame>,
    tracking_stack: Vec<String>,
    replay_cursor: usize,
    restoring: bool,
    /// Conjunction of the tracking flags of every activity currently
    /// entered; gates tracking-stack pushes.
    tracking: bool,
    priority: Priority,
    activity_states: HashMap<String, ActivityState>,
    initialized_order: Vec<String>,
    event_handlers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
struct InterruptRequest {
    target: String,
    priority: Priority,
}

#[derive(Default)]
struct InterruptState {
    pending: Option<InterruptRequest>,
    armed: bool,
}

/// Result of [`WorkflowExecutionContext::wait_one_or_all_others`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    One,
    AllOthers,
}

/// A cloneable manual-reset event, the sanctioned signalling primitive for
/// the context's blocking surface.
#[derive(Clone)]
pub struct WaitHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl WaitHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so the channel cannot close under us.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for WaitHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-instance mutable execution state: the dual execution/tracking stack,
/// the priority-gated single-slot interrupt machinery, checkpoint replay,
/// the event registry, and the interrupt-aware wait surface.
///
/// Two coarse locks guard shared state: `inner` for the stack pair and
/// activity runtime state, `interrupt` for the preemption handshake. Neither
/// is ever held across an await point.
pub struct WorkflowExecutionContext {
    scheme: Arc<WorkflowScheme>,
    inner: Mutex<ContextState>,
    interrupt: Mutex<InterruptState>,
    /// Raised while an interrupt is armed; observed by every blocking wait
    /// and by the check on each activity entry.
    armed_tx: watch::Sender<bool>,
    /// Low while an interruption is being resolved; the dispatcher admits
    /// the next request only once it flips back.
    finished_tx: watch::Sender<bool>,
    requests_tx: watch::Sender<Option<InterruptRequest>>,
    requests_rx: Mutex<Option<watch::Receiver<Option<InterruptRequest>>>>,
    changes_tx: broadcast::Sender<ContextSnapshot>,
}

impl WorkflowExecutionContext {
    pub fn new(scheme: Arc<WorkflowScheme>) -> Arc<Self> {
        Self::with_state(scheme, Vec::new(), HashMap::new())
    }

    /// Reconstruct a context from persisted state. The context starts in
    /// restoring mode iff the restored tracking stack is non-empty.
    pub fn restore(scheme: Arc<WorkflowScheme>, snapshot: ContextSnapshot) -> Arc<Self> {
        Self::with_state(scheme, snapshot.tracking_stack, snapshot.event_handlers)
    }

    fn with_state(
        scheme: Arc<WorkflowScheme>,
        tracking_stack: Vec<String>,
        event_handlers: HashMap<String, Vec<String>>,
    ) -> Arc<Self> {
        let restoring = !tracking_stack.is_empty();
        let (armed_tx, _) = watch::channel(false);
        let (finished_tx, _) = watch::channel(true);
        let (requests_tx, requests_rx) = watch::channel(None);
        let (changes_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            scheme,
            inner: Mutex::new(ContextState {
                execution_stack: Vec::new(),
                tracking_stack,
                replay_cursor: 0,
                restoring,
                tracking: true,
                priority: Priority::NORMAL,
                activity_states: HashMap::new(),
                initialized_order: Vec::new(),
                event_handlers,
            }),
            interrupt: Mutex::new(InterruptState::default()),
            armed_tx,
            finished_tx,
            requests_tx,
            requests_rx: Mutex::new(Some(requests_rx)),
            changes_tx,
        })
    }

    pub fn scheme(&self) -> &Arc<WorkflowScheme> {
        &self.scheme
    }

    pub fn restoring(&self) -> bool {
        self.inner.lock().restoring
    }

    pub fn priority(&self) -> Priority {
        self.inner.lock().priority
    }

    pub fn execution_stack(&self) -> Vec<String> {
        self.inner
            .lock()
            .execution_stack
            .iter()
            .map(|f| f.name.clone())
            .collect()
    }

    pub fn tracking_stack(&self) -> Vec<String> {
        self.inner.lock().tracking_stack.clone()
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let st = self.inner.lock();
        snapshot_of(&self.scheme, &st)
    }

    /// Each tracking-stack push emits the fresh snapshot here; the runtime
    /// routes it to the persistence service.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ContextSnapshot> {
        self.changes_tx.subscribe()
    }

    // ----- stack machinery -------------------------------------------------

    /// Mark `activity` as entering execution.
    ///
    /// Pushes the execution frame, records the checkpoint (or replays it when
    /// restoring), then performs the interrupt check every activity entry is
    /// subject to. On `Err` the frame is already pushed; the caller runs
    /// [`leave`](Self::leave) exactly as it would after a normal execution.
    pub fn enter(&self, activity: &Activity) -> Result<(), ActivityError> {
        let mut change = None;
        let mut replay_error = None;
        let priority;
        {
            let mut st = self.inner.lock();
            let eligible = st.tracking && activity.tracking;
            let frame = Frame {
                name: activity.name.clone(),
                saved_tracking: st.tracking,
                saved_priority: st.priority,
            };
            st.execution_stack.push(frame);
            st.tracking = eligible;
            st.priority = activity.priority;
            priority = st.priority;

            if eligible {
                if st.restoring {
                    match st.tracking_stack.get(st.replay_cursor).cloned() {
                        Some(expected) if expected == activity.name => {
                            st.replay_cursor += 1;
                            if st.replay_cursor == st.tracking_stack.len() {
                                st.restoring = false;
                            }
                        }
                        expected => {
                            replay_error = Some(ActivityError::ReplayMismatch {
                                expected: expected.unwrap_or_default(),
                                actual: activity.name.clone(),
                            });
                        }
                    }
                } else {
                    st.tracking_stack.push(activity.name.clone());
                    change = Some(snapshot_of(&self.scheme, &st));
                }
            }
        }

        if let Some(snapshot) = change {
            let _ = self.changes_tx.send(snapshot);
        }
        if let Some(err) = replay_error {
            return Err(err);
        }
        self.check_interrupt(priority)
    }

    /// Mark `activity` as leaving execution, restoring the enclosing frame's
    /// tracking eligibility and priority. The tracking stack pops only when
    /// its top is this activity; an activity can execute without being
    /// tracked.
    pub fn leave(&self, activity: &Activity) {
        let mut st = self.inner.lock();
        if let Some(frame) = st.execution_stack.pop() {
            debug_assert_eq!(frame.name, activity.name, "unbalanced enter/leave");
            st.tracking = frame.saved_tracking;
            st.priority = frame.saved_priority;
        }
        if st.tracking_stack.last().map(String::as_str) == Some(activity.name.as_str()) {
            st.tracking_stack.pop();
        }
    }

    /// Next checkpoint name due for replay, if the context is restoring.
    /// Composites use this to pick the start child on the recorded path.
    pub fn replay_expected(&self) -> Option<String> {
        let st = self.inner.lock();
        if st.restoring {
            st.tracking_stack.get(st.replay_cursor).cloned()
        } else {
            None
        }
    }

    // ----- per-activity runtime state --------------------------------------

    /// Idempotence guard for `initialize`: returns true exactly once per
    /// activity per instance. The composite start override is cleared here,
    /// matching initialization.
    pub fn begin_initialize(&self, activity: &str) -> bool {
        let mut st = self.inner.lock();
        let state = st.activity_states.entry(activity.to_string()).or_default();
        if state.initialized {
            return false;
        }
        state.initialized = true;
        state.start_override = None;
        st.initialized_order.push(activity.to_string());
        true
    }

    /// Activities initialized so far, in initialization order. The worker
    /// uninitializes them once when it exits.
    pub fn initialized_activities(&self) -> Vec<String> {
        self.inner.lock().initialized_order.clone()
    }

    pub fn start_override(&self, composite: &str) -> Option<String> {
        self.inner
            .lock()
            .activity_states
            .get(composite)
            .and_then(|s| s.start_override.clone())
    }

    pub fn set_start_override(&self, composite: &str, child: &str) {
        let mut st = self.inner.lock();
        st.activity_states
            .entry(composite.to_string())
            .or_default()
            .start_override = Some(child.to_string());
    }

    pub fn set_property_override(&self, activity: &str, property: &str, value: Value) {
        let mut st = self.inner.lock();
        st.activity_states
            .entry(activity.to_string())
            .or_default()
            .property_overrides
            .insert(property.to_string(), value);
    }

    // ----- preemption ------------------------------------------------------

    /// Enqueue a redirection request at the given priority.
    ///
    /// The single-slot channel keeps exactly one unconsumed request: a later
    /// request replaces an earlier one the dispatcher has not picked up yet.
    pub fn toggle_execution_to(&self, target: &Activity, priority: Priority) {
        tracing::debug!(target = %target.name, %priority, "redirection requested");
        self.requests_tx.send_replace(Some(InterruptRequest {
            target: target.name.clone(),
            priority,
        }));
    }

    /// Dispatch loop draining redirection requests one at a time, each fully
    /// resolved before the next is considered. Runs as its own task for the
    /// life of the instance.
    pub async fn run_interrupt_dispatcher(&self, cancel: CancellationToken) {
        let Some(mut requests) = self.requests_rx.lock().take() else {
            // A second dispatcher on the same context is a wiring bug.
            tracing::warn!("interrupt dispatcher already running");
            return;
        };
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = requests.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
            let Some(request) = requests.borrow_and_update().clone() else {
                continue;
            };
            let mut finished = self.finished_tx.subscribe();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    res = finished.wait_for(|done| *done) => {
                        if res.is_err() {
                            return;
                        }
                    }
                }
                let mut it = self.interrupt.lock();
                // Another interruption may have started between the wait and
                // the lock; wait again if so.
                if !*self.finished_tx.borrow() {
                    continue;
                }
                // A newer request supersedes this one while it is still
                // unarmed; drop it and serve the replacement instead.
                if requests.has_changed().unwrap_or(false) {
                    break;
                }
                let current = self.inner.lock().priority;
                it.pending = Some(request.clone());
                if request.priority >= current {
                    self.arm(&mut it);
                } else {
                    tracing::debug!(
                        target = %request.target,
                        "interrupt deferred: priority {} below context {}",
                        request.priority,
                        current
                    );
                }
                break;
            }
        }
    }

    fn arm(&self, it: &mut InterruptState) {
        it.armed = true;
        self.finished_tx.send_replace(false);
        self.armed_tx.send_replace(true);
    }

    /// The per-entry interrupt check: observes an armed interrupt, and arms
    /// a deferred one whose priority now suffices: a drop in context
    /// priority retroactively arms it without a new request.
    fn check_interrupt(&self, current: Priority) -> Result<(), ActivityError> {
        let mut it = self.interrupt.lock();
        if it.armed {
            return Err(ActivityError::Interrupted);
        }
        if let Some(pending) = &it.pending {
            if pending.priority >= current {
                self.arm(&mut it);
                return Err(ActivityError::Interrupted);
            }
        }
        Ok(())
    }

    /// True iff the stack is unwound far enough to execute `target`: either
    /// nothing is executing, or the innermost executing activity is the
    /// target's parent.
    pub fn is_stack_ready_for(&self, target: &Activity) -> bool {
        let st = self.inner.lock();
        match st.execution_stack.last() {
            None => true,
            Some(top) => target.parent.as_deref() == Some(top.name.as_str()),
        }
    }

    /// Consume the pending interrupt if the stack is ready for its target.
    ///
    /// Clears the armed state, marks the interruption finished, and resets
    /// the context tracking flag to what it would be had execution reached
    /// the target by normal flow (the conjunction of its ancestors' tracking
    /// flags). Returns `None` when the caller must keep unwinding.
    pub fn resume_target(&self) -> Option<Arc<Activity>> {
        let target = {
            let it = self.interrupt.lock();
            let pending = it.pending.as_ref()?;
            self.scheme.get(&pending.target)?.clone()
        };
        if !self.is_stack_ready_for(&target) {
            return None;
        }

        let mut ancestors_tracked = true;
        let mut cursor = self.scheme.parent_of(&target);
        while let Some(ancestor) = cursor {
            if !ancestor.tracking {
                ancestors_tracked = false;
                break;
            }
            cursor = self.scheme.parent_of(ancestor);
        }
        self.inner.lock().tracking = ancestors_tracked;

        let mut it = self.interrupt.lock();
        it.pending = None;
        it.armed = false;
        self.armed_tx.send_replace(false);
        self.finished_tx.send_replace(true);
        tracing::debug!(target = %target.name, "resuming at interrupt target");
        Some(target)
    }

    pub fn interrupt_armed(&self) -> bool {
        *self.armed_tx.borrow()
    }

    /// Name of the recorded-but-unconsumed redirection target, if any.
    pub fn interrupt_pending(&self) -> Option<String> {
        self.interrupt.lock().pending.as_ref().map(|p| p.target.clone())
    }

    // ----- event registry --------------------------------------------------

    pub fn subscribe_event(&self, event: &str, handler: &str) {
        let mut st = self.inner.lock();
        let handlers = st.event_handlers.entry(event.to_string()).or_default();
        if !handlers.iter().any(|h| h == handler) {
            handlers.push(handler.to_string());
        }
    }

    pub fn unsubscribe_event(&self, event: &str, handler: &str) {
        let mut st = self.inner.lock();
        if let Some(handlers) = st.event_handlers.get_mut(event) {
            handlers.retain(|h| h != handler);
            if handlers.is_empty() {
                st.event_handlers.remove(event);
            }
        }
    }

    pub fn event_handlers(&self, event: &str) -> Vec<String> {
        self.inner
            .lock()
            .event_handlers
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    // ----- monitor stubs ---------------------------------------------------

    // TODO: monitor locks need defined semantics (scope, reentrancy, unwind
    // behavior on preemption) before they can take real locks.

    pub fn monitor_enter(&self, lock: &str) {
        tracing::warn!(lock, "monitor_enter is a stub; no lock taken");
    }

    pub fn monitor_exit(&self, lock: &str) {
        tracing::warn!(lock, "monitor_exit is a stub; no lock released");
    }

    // ----- blocking surface ------------------------------------------------

    async fn interrupted(&self) {
        let mut armed = self.armed_tx.subscribe();
        let _ = armed.wait_for(|armed| *armed).await;
    }

    /// Interrupt-aware sleep: resolves early with `Interrupted` if a
    /// redirection arms while sleeping.
    pub async fn sleep(&self, duration: Duration) -> Result<(), ActivityError> {
        tokio::select! {
            _ = self.interrupted() => Err(ActivityError::Interrupted),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Wait for one handle. `Ok(true)` when it was signalled, `Ok(false)` on
    /// timeout.
    pub async fn wait_one(
        &self,
        handle: &WaitHandle,
        timeout: Option<Duration>,
    ) -> Result<bool, ActivityError> {
        let timeout = timeout.unwrap_or(Duration::MAX);
        tokio::select! {
            _ = self.interrupted() => Err(ActivityError::Interrupted),
            _ = handle.wait() => Ok(true),
            _ = tokio::time::sleep(timeout) => Ok(false),
        }
    }

    /// Wait for the first of several handles; resolves to its index, or
    /// `None` on timeout.
    pub async fn wait_any(
        &self,
        handles: &[WaitHandle],
        timeout: Option<Duration>,
    ) -> Result<Option<usize>, ActivityError> {
        let timeout = timeout.unwrap_or(Duration::MAX);
        if handles.is_empty() {
            self.sleep(timeout).await?;
            return Ok(None);
        }
        let waits = handles
            .iter()
            .map(|h| Box::pin(h.wait()))
            .collect::<Vec<_>>();
        tokio::select! {
            _ = self.interrupted() => Err(ActivityError::Interrupted),
            (_, index, _) = futures::future::select_all(waits) => Ok(Some(index)),
            _ = tokio::time::sleep(timeout) => Ok(None),
        }
    }

    /// Wait until either `one` is signalled or every handle in `others` is.
    pub async fn wait_one_or_all_others(
        &self,
        one: &WaitHandle,
        others: &[WaitHandle],
    ) -> Result<WaitOutcome, ActivityError> {
        let all_others = futures::future::join_all(others.iter().map(|h| h.wait()));
        tokio::select! {
            _ = self.interrupted() => Err(ActivityError::Interrupted),
            _ = one.wait() => Ok(WaitOutcome::One),
            _ = all_others => Ok(WaitOutcome::AllOthers),
        }
    }
}

impl PropertySource for WorkflowExecutionContext {
    /// Runtime property overrides layer over the static declarations of the
    /// scheme.
    fn property(&self, activity: &str, property: &str) -> Option<Value> {
        if let Some(value) = self
            .inner
            .lock()
            .activity_states
            .get(activity)
            .and_then(|s| s.property_overrides.get(property))
        {
            return Some(value.clone());
        }
        self.scheme
            .get(activity)
            .and_then(|a| a.properties.get(property).cloned())
    }
}

fn snapshot_of(scheme: &WorkflowScheme, st: &ContextState) -> ContextSnapshot {
    ContextSnapshot {
        scheme: scheme.name.clone(),
        tracking_stack: st.tracking_stack.clone(),
        event_handlers: st.event_handlers.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> Arc<WorkflowScheme> {
        let mut b = WorkflowScheme::builder("ctx", "Done");
        b.composite("Root");
        b.composite("Root.Side").no_tracking().priority(Priority(5));
        b.activity("Root.Side.Inner");
        b.activity("Root.Step");
        b.build().expect("valid scheme")
    }

    #[test]
    fn leave_restores_tracking_and_priority_of_enclosing_frame() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::new(scheme.clone());
        let root = scheme.require("Root").unwrap();
        let side = scheme.require("Root.Side").unwrap();

        ctx.enter(&root).unwrap();
        assert_eq!(ctx.priority(), Priority::NORMAL);

        ctx.enter(&side).unwrap();
        assert_eq!(ctx.priority(), Priority(5));

        ctx.leave(&side);
        assert_eq!(ctx.priority(), Priority::NORMAL);
        assert_eq!(ctx.execution_stack(), vec!["Root"]);
    }

    #[test]
    fn untracked_frame_excludes_descendants_from_checkpoint_log() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::new(scheme.clone());
        let root = scheme.require("Root").unwrap();
        let side = scheme.require("Root.Side").unwrap();
        let inner = scheme.require("Root.Side.Inner").unwrap();

        ctx.enter(&root).unwrap();
        ctx.enter(&side).unwrap();
        // Inner is tracked by default, but its untracked ancestor gates it.
        ctx.enter(&inner).unwrap();
        assert_eq!(ctx.tracking_stack(), vec!["Root"]);

        ctx.leave(&inner);
        ctx.leave(&side);
        let step = scheme.require("Root.Step").unwrap();
        ctx.enter(&step).unwrap();
        assert_eq!(ctx.tracking_stack(), vec!["Root", "Root.Step"]);
    }

    #[test]
    fn snapshot_survives_json_round_trip_and_drives_restoring() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::new(scheme.clone());
        let root = scheme.require("Root").unwrap();
        let step = scheme.require("Root.Step").unwrap();
        ctx.enter(&root).unwrap();
        ctx.enter(&step).unwrap();
        ctx.subscribe_event("alarm", "Root.Step");

        let json = serde_json::to_string(&ctx.snapshot()).unwrap();
        let decoded: ContextSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, ctx.snapshot());

        let restored = WorkflowExecutionContext::restore(scheme.clone(), decoded);
        assert!(restored.restoring());
        assert_eq!(restored.tracking_stack(), vec!["Root", "Root.Step"]);
        assert_eq!(restored.event_handlers("alarm"), vec!["Root.Step"]);

        let empty = WorkflowExecutionContext::restore(
            scheme,
            ContextSnapshot {
                scheme: "ctx".to_string(),
                tracking_stack: Vec::new(),
                event_handlers: HashMap::new(),
            },
        );
        assert!(!empty.restoring());
    }

    #[test]
    fn replay_consumes_recorded_entries_without_new_checkpoints() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::restore(
            scheme.clone(),
            ContextSnapshot {
                scheme: "ctx".to_string(),
                tracking_stack: vec!["Root".to_string(), "Root.Step".to_string()],
                event_handlers: HashMap::new(),
            },
        );
        let root = scheme.require("Root").unwrap();
        let step = scheme.require("Root.Step").unwrap();

        assert_eq!(ctx.replay_expected(), Some("Root".to_string()));
        ctx.enter(&root).unwrap();
        assert_eq!(ctx.replay_expected(), Some("Root.Step".to_string()));
        ctx.enter(&step).unwrap();
        assert!(!ctx.restoring());
        assert_eq!(ctx.tracking_stack(), vec!["Root", "Root.Step"]);
    }

    #[test]
    fn replay_divergence_is_a_mismatch() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::restore(
            scheme.clone(),
            ContextSnapshot {
                scheme: "ctx".to_string(),
                tracking_stack: vec!["Root".to_string(), "Root.Side.Inner".to_string()],
                event_handlers: HashMap::new(),
            },
        );
        let root = scheme.require("Root").unwrap();
        let step = scheme.require("Root.Step").unwrap();

        ctx.enter(&root).unwrap();
        assert!(matches!(
            ctx.enter(&step),
            Err(ActivityError::ReplayMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn wait_one_resolves_on_signal_and_timeout() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::new(scheme);
        let handle = WaitHandle::new();

        let quick = ctx.wait_one(&handle, Some(Duration::from_millis(20))).await;
        assert_eq!(quick.unwrap(), false);

        handle.set();
        let signalled = ctx.wait_one(&handle, None).await;
        assert_eq!(signalled.unwrap(), true);

        handle.reset();
        assert!(!handle.is_set());
    }

    #[tokio::test]
    async fn wait_any_returns_index_of_first_signalled() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::new(scheme);
        let handles = vec![WaitHandle::new(), WaitHandle::new(), WaitHandle::new()];
        handles[1].set();

        let index = ctx.wait_any(&handles, None).await.unwrap();
        assert_eq!(index, Some(1));

        let none = ctx
            .wait_any(&[], Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn wait_one_or_all_others_both_arms() {
        let scheme = scheme();
        let ctx = WorkflowExecutionContext::new(scheme);

        let one = WaitHandle::new();
        let others = vec![WaitHandle::new(), WaitHandle::new()];
        one.set();
        assert_eq!(
            ctx.wait_one_or_all_others(&one, &others).await.unwrap(),
            WaitOutcome::One
        );

        let one = WaitHandle::new();
        others[0].set();
        others[1].set();
        assert_eq!(
            ctx.wait_one_or_all_others(&one, &others).await.unwrap(),
            WaitOutcome::AllOthers
        );
    }
}
