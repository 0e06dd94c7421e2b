use actcore::{
    handler_fn, ActivityHandler, ActivityScope, ContextSnapshot, EngineEvent, NextActivityKey,
    WorkflowScheme,
};
use actruntime::{InMemoryPersistence, PersistenceProvider, WorkflowRuntime};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

type Visits = Arc<Mutex<Vec<String>>>;

fn recording(visits: &Visits) -> Arc<dyn ActivityHandler> {
    let visits = visits.clone();
    handler_fn(move |scope: ActivityScope| {
        let visits = visits.clone();
        async move {
            visits.lock().push(scope.activity.name.clone());
            Ok(scope.default_key())
        }
    })
}

fn pipeline(visits: &Visits) -> Arc<WorkflowScheme> {
    let mut b = WorkflowScheme::builder("pipeline", "Done");
    b.composite("Root");
    b.activity("Root.Step1").handler(recording(visits));
    b.activity("Root.Step2").handler(recording(visits));
    b.activity("Root.Step3").handler(recording(visits));
    b.build().unwrap()
}

async fn outcome(
    mut events: tokio::sync::broadcast::Receiver<EngineEvent>,
    id: Uuid,
) -> Result<NextActivityKey, String> {
    loop {
        match events.recv().await.expect("event stream open") {
            EngineEvent::WorkflowCompleted { workflow_id, result, .. } if workflow_id == id => {
                return Ok(result);
            }
            EngineEvent::WorkflowTerminated { workflow_id, reason, .. } if workflow_id == id => {
                return Err(reason);
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn restore_replays_recorded_path_and_skips_completed_steps() {
    let visits: Visits = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(InMemoryPersistence::new());
    let id = Uuid::new_v4();

    // As persisted while Root.Step2 was executing.
    store
        .save(
            id,
            &ContextSnapshot {
                scheme: "pipeline".to_string(),
                tracking_stack: vec!["Root".to_string(), "Root.Step2".to_string()],
                event_handlers: HashMap::new(),
            },
        )
        .await
        .unwrap();

    let runtime = WorkflowRuntime::new();
    runtime.set_persistence(store).unwrap();
    runtime.start_runtime();
    runtime.register_scheme(pipeline(&visits));
    let events = runtime.subscribe_events();

    let instance = runtime.restore_workflow(id).await.unwrap();
    assert!(instance.context().restoring());

    instance.start();
    tokio::time::timeout(Duration::from_secs(10), instance.join())
        .await
        .expect("worker finished");

    // Step1 completed before the snapshot; the interrupted Step2 re-executes.
    assert_eq!(*visits.lock(), vec!["Root.Step2", "Root.Step3"]);
    assert!(!instance.context().restoring());
    assert_eq!(outcome(events, id).await, Ok(NextActivityKey::new("Done")));
}

#[tokio::test]
async fn restore_descends_nested_composites_on_the_recorded_path() {
    let visits: Visits = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(InMemoryPersistence::new());
    let id = Uuid::new_v4();

    let mut b = WorkflowScheme::builder("nested", "Done");
    b.composite("Root");
    b.composite("Root.Sub");
    b.activity("Root.Sub.Step1").handler(recording(&visits));
    b.activity("Root.Sub.Step2").handler(recording(&visits));
    b.activity("Root.After").handler(recording(&visits));
    let scheme = b.build().unwrap();

    // As persisted while Root.Sub.Step2 was executing, two composites deep.
    store
        .save(
            id,
            &ContextSnapshot {
                scheme: "nested".to_string(),
                tracking_stack: vec![
                    "Root".to_string(),
                    "Root.Sub".to_string(),
                    "Root.Sub.Step2".to_string(),
                ],
                event_handlers: HashMap::new(),
            },
        )
        .await
        .unwrap();

    let runtime = WorkflowRuntime::new();
    runtime.set_persistence(store).unwrap();
    runtime.start_runtime();
    runtime.register_scheme(scheme);
    let events = runtime.subscribe_events();

    let instance = runtime.restore_workflow(id).await.unwrap();
    instance.start();
    tokio::time::timeout(Duration::from_secs(10), instance.join())
        .await
        .expect("worker finished");

    // Each composite picks the recorded child, so Step1 is skipped; normal
    // flow resumes after the replayed leaf.
    assert_eq!(*visits.lock(), vec!["Root.Sub.Step2", "Root.After"]);
    assert_eq!(outcome(events, id).await, Ok(NextActivityKey::new("Done")));
}

#[tokio::test]
async fn replay_divergence_terminates_the_workflow() {
    let visits: Visits = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(InMemoryPersistence::new());
    let id = Uuid::new_v4();

    // The recorded checkpoint names an activity the scheme no longer has.
    store
        .save(
            id,
            &ContextSnapshot {
                scheme: "pipeline".to_string(),
                tracking_stack: vec!["Root".to_string(), "Root.Ghost".to_string()],
                event_handlers: HashMap::new(),
            },
        )
        .await
        .unwrap();

    let runtime = WorkflowRuntime::new();
    runtime.set_persistence(store).unwrap();
    runtime.start_runtime();
    runtime.register_scheme(pipeline(&visits));
    let events = runtime.subscribe_events();

    let instance = runtime.restore_workflow(id).await.unwrap();
    instance.start();
    tokio::time::timeout(Duration::from_secs(10), instance.join())
        .await
        .expect("worker finished");

    assert_eq!(
        outcome(events, id).await,
        Err("Checkpoint replay mismatch".to_string())
    );
}

#[tokio::test]
async fn restore_workflow_without_snapshot_is_an_error() {
    let runtime = WorkflowRuntime::new();
    runtime.start_runtime();
    let missing = runtime.restore_workflow(Uuid::new_v4()).await;
    assert!(matches!(
        missing,
        Err(actcore::EngineError::WorkflowNotFound(_))
    ));
}

#[tokio::test]
async fn restore_or_create_falls_back_to_a_fresh_instance() {
    let visits: Visits = Arc::new(Mutex::new(Vec::new()));
    let runtime = WorkflowRuntime::new();
    runtime.start_runtime();
    let events = runtime.subscribe_events();
    let id = Uuid::new_v4();

    let instance = runtime
        .restore_or_create_workflow(id, pipeline(&visits))
        .await
        .unwrap();
    assert!(!instance.context().restoring());

    instance.start();
    tokio::time::timeout(Duration::from_secs(10), instance.join())
        .await
        .expect("worker finished");

    assert_eq!(
        *visits.lock(),
        vec!["Root.Step1", "Root.Step2", "Root.Step3"]
    );
    assert_eq!(outcome(events, id).await, Ok(NextActivityKey::new("Done")));
}

#[tokio::test]
async fn checkpoint_changes_flow_into_the_persistence_service() {
    let visits: Visits = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(InMemoryPersistence::new());

    let runtime = WorkflowRuntime::new();
    runtime.set_persistence(store.clone()).unwrap();
    runtime.start_runtime();
    let id = Uuid::new_v4();
    let instance = runtime.create_workflow(id, pipeline(&visits)).unwrap();
    instance.start();
    tokio::time::timeout(Duration::from_secs(10), instance.join())
        .await
        .expect("worker finished");

    // The pump runs on its own task; give it a moment to drain.
    let mut saved = None;
    for _ in 0..500 {
        saved = store.load(id).await.unwrap();
        if saved
            .as_ref()
            .is_some_and(|s| s.tracking_stack == ["Root", "Root.Step3"])
        {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let saved = saved.expect("snapshot saved");
    assert_eq!(saved.scheme, "pipeline");
    assert_eq!(saved.tracking_stack, vec!["Root", "Root.Step3"]);
}

#[tokio::test]
async fn untracked_activities_never_reach_the_checkpoint_log() {
    let visits: Visits = Arc::new(Mutex::new(Vec::new()));

    let mut b = WorkflowScheme::builder("untracked", "Done");
    b.composite("Root");
    // The whole Side subtree is excluded, including its tracked-by-default
    // child.
    b.composite("Root.Side").no_tracking();
    b.activity("Root.Side.Inner").handler(recording(&visits));
    b.activity("Root.Step").handler(recording(&visits));
    let scheme = b.build().unwrap();

    let store = Arc::new(InMemoryPersistence::new());
    let runtime = WorkflowRuntime::new();
    runtime.set_persistence(store.clone()).unwrap();
    runtime.start_runtime();
    let id = Uuid::new_v4();
    let instance = runtime.create_workflow(id, scheme).unwrap();

    let mut changes = instance.context().subscribe_changes();
    instance.start();
    tokio::time::timeout(Duration::from_secs(10), instance.join())
        .await
        .expect("worker finished");

    assert_eq!(*visits.lock(), vec!["Root.Side.Inner", "Root.Step"]);
    while let Ok(snapshot) = changes.try_recv() {
        assert!(!snapshot.tracking_stack.iter().any(|a| a.contains("Side")));
    }
}
