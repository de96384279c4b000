use crate::task::{CollaborationTask, TaskStatus, WorkerId};
use crate::SwitchboardResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter for [`TaskStore::query`]. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskQuery {
    pub id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub target: Option<WorkerId>,
}

impl TaskQuery {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_target(mut self, target: impl Into<WorkerId>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn matches(&self, task: &CollaborationTask) -> bool {
        self.id.map_or(true, |id| id == task.id)
            && self.status.map_or(true, |s| s == task.status)
            && self.target.as_ref().map_or(true, |t| t == &task.target)
    }
}

/// Best-effort datastore for task records, keyed by task id.
///
/// The in-memory lifecycle state stays authoritative; failures here are
/// logged and retried, never propagated into routing decisions.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: &CollaborationTask) -> SwitchboardResult<()>;
    async fn update(&self, task: &CollaborationTask) -> SwitchboardResult<()>;
    async fn query(&self, query: &TaskQuery) -> SwitchboardResult<Vec<CollaborationTask>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::task::CollaborationType;

    #[test]
    fn test_query_matching() {
        let task = CollaborationTask::new("a", "billing", CollaborationType::Delegation, "x");
        assert!(TaskQuery::default().matches(&task));
        assert!(TaskQuery::by_id(task.id).matches(&task));
        assert!(!TaskQuery::by_id(Uuid::new_v4()).matches(&task));
        assert!(TaskQuery::default()
            .with_status(TaskStatus::Pending)
            .with_target("billing")
            .matches(&task));
        assert!(!TaskQuery::default().with_target("support").matches(&task));
    }
}
