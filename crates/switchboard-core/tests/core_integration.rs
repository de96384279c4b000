#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use std::sync::Mutex;
use switchboard_core::*;

// ---------------------------------------------------------------------------
// 1. Task record survives a JSON round trip with all lifecycle fields
// ---------------------------------------------------------------------------

#[test]
fn task_record_serialization() {
    let mut task = CollaborationTask::new(
        "triage",
        "billing",
        CollaborationType::Delegation,
        "Customer disputes a charge",
    )
    .with_priority(Priority::Urgent)
    .with_payload(serde_json::json!({"ticket": 4411}))
    .with_metadata("required_capabilities", serde_json::json!(["billing"]));
    task.status = TaskStatus::Completed;
    task.result = Some(serde_json::json!({"refund": "issued"}));
    task.completed_at = Some(task.requested_at);

    let json = serde_json::to_string(&task).unwrap();
    let parsed: CollaborationTask = serde_json::from_str(&json).unwrap();

    assert_eq!(parsed.id, task.id);
    assert_eq!(parsed.priority, Priority::Urgent);
    assert_eq!(parsed.status, TaskStatus::Completed);
    assert!(parsed.status.is_terminal());
    assert_eq!(parsed.payload["ticket"], 4411);
    assert_eq!(parsed.result.unwrap()["refund"], "issued");
    assert_eq!(parsed.completed_at, Some(task.requested_at));
}

// ---------------------------------------------------------------------------
// 2. A trivial TaskStore implementation honours TaskQuery filters
// ---------------------------------------------------------------------------

struct VecStore {
    tasks: Mutex<Vec<CollaborationTask>>,
}

#[async_trait]
impl TaskStore for VecStore {
    async fn insert(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        self.tasks.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn update(&self, task: &CollaborationTask) -> SwitchboardResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(SwitchboardError::TaskNotFound(task.id)),
        }
    }

    async fn query(&self, query: &TaskQuery) -> SwitchboardResult<Vec<CollaborationTask>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }
}

#[tokio::test]
async fn task_store_query_filters() {
    let store = VecStore {
        tasks: Mutex::new(Vec::new()),
    };
    let a = CollaborationTask::new("s", "billing", CollaborationType::Delegation, "a");
    let mut b = CollaborationTask::new("s", "support", CollaborationType::Consultation, "b");
    store.insert(&a).await.unwrap();
    store.insert(&b).await.unwrap();

    b.status = TaskStatus::Accepted;
    store.update(&b).await.unwrap();

    let billing = store
        .query(&TaskQuery::default().with_target("billing"))
        .await
        .unwrap();
    assert_eq!(billing.len(), 1);
    assert_eq!(billing[0].id, a.id);

    let accepted = store
        .query(&TaskQuery::default().with_status(TaskStatus::Accepted))
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id, b.id);

    let missing = CollaborationTask::new("s", "x", CollaborationType::JointTask, "c");
    let err = store.update(&missing).await.unwrap_err();
    assert_eq!(err.kind(), "task_not_found");
}
