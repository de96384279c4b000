use async_trait::async_trait;
use std::collections::HashMap;
use switchboard_core::{CollaborationTask, SwitchboardResult, TaskQuery, TaskStore};
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-process store. Default backend; nothing survives a restart.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<Uuid, CollaborationTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn update(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        self.insert(task).await
    }

    async fn query(&self, query: &TaskQuery) -> SwitchboardResult<Vec<CollaborationTask>> {
        let mut out: Vec<_> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.requested_at);
        Ok(out)
    }
}
