use actcore::{ContextSnapshot, EngineError, WorkflowId, WorkflowScheme};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Durable storage for execution-context snapshots.
///
/// `save` is invoked on every checkpoint-log change of a running instance;
/// `load` on explicit restore requests. Implementations decide everything
/// else (encoding, retention, location).
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    async fn save(
        &self,
        workflow_id: WorkflowId,
        snapshot: &ContextSnapshot,
    ) -> Result<(), EngineError>;

    async fn load(&self, workflow_id: WorkflowId) -> Result<Option<ContextSnapshot>, EngineError>;
}

/// Resolves a scheme source (a name, a path, or a DSL document, whatever the
/// host compiler understands) into a compiled scheme.
#[async_trait]
pub trait SchemeLoader: Send + Sync {
    async fn load(&self, source: &str) -> Result<Arc<WorkflowScheme>, EngineError>;
}

/// Keeps the latest snapshot per workflow in process memory. The default
/// provider wired by `start_runtime` when the host registers nothing.
#[derive(Default)]
pub struct InMemoryPersistence {
    store: Mutex<HashMap<WorkflowId, ContextSnapshot>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

#[async_trait]
impl PersistenceProvider for InMemoryPersistence {
    async fn save(
        &self,
        workflow_id: WorkflowId,
        snapshot: &ContextSnapshot,
    ) -> Result<(), EngineError> {
        self.store.lock().insert(workflow_id, snapshot.clone());
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> Result<Option<ContextSnapshot>, EngineError> {
        Ok(self.store.lock().get(&workflow_id).cloned())
    }
}

/// Stores one pretty-printed JSON snapshot file per workflow id.
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, workflow_id: WorkflowId) -> PathBuf {
        self.dir.join(format!("{workflow_id}.json"))
    }
}

#[async_trait]
impl PersistenceProvider for FilePersistence {
    async fn save(
        &self,
        workflow_id: WorkflowId,
        snapshot: &ContextSnapshot,
    ) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(workflow_id), json).await?;
        Ok(())
    }

    async fn load(&self, workflow_id: WorkflowId) -> Result<Option<ContextSnapshot>, EngineError> {
        let path = self.path_for(workflow_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn snapshot() -> ContextSnapshot {
        ContextSnapshot {
            scheme: "sample".to_string(),
            tracking_stack: vec!["Root".to_string(), "Root.Step".to_string()],
            event_handlers: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        let id = Uuid::new_v4();
        store.save(id, &snapshot()).await.unwrap();
        assert_eq!(store.load(id).await.unwrap(), Some(snapshot()));
        assert_eq!(store.load(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = std::env::temp_dir().join(format!("actflow-test-{}", Uuid::new_v4()));
        let store = FilePersistence::new(&dir);
        let id = Uuid::new_v4();
        store.save(id, &snapshot()).await.unwrap();
        assert_eq!(store.load(id).await.unwrap(), Some(snapshot()));
        assert_eq!(store.load(Uuid::new_v4()).await.unwrap(), None);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
