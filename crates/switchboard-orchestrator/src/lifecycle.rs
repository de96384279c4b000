//! Collaboration task state machine and load accounting.
//!
//! The task table sits behind a single mutex that every transition, including
//! the auto-accept sweep, goes through. Lock order is always task table first,
//! then registry. Nothing awaits while either lock is held.
//!
//! A task reserves one unit of its target's load when it is created and gives
//! it back, together with its outcome, on its terminal transition.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use switchboard_core::{
    CollaborationTask, CollaborationType, Priority, SwitchboardError, SwitchboardResult, TaskQuery,
    TaskStatus,
};
use switchboard_routing::CapabilityRegistry;
use tracing::{info, warn};
use uuid::Uuid;

/// Feedback recorded on tasks the sweep accepts.
pub const AUTO_ACCEPT_FEEDBACK: &str = "Auto-accepted low priority delegation";

pub struct LifecycleManager {
    tasks: Mutex<HashMap<Uuid, CollaborationTask>>,
    registry: Arc<CapabilityRegistry>,
    auto_accept_after: chrono::Duration,
}

impl LifecycleManager {
    pub fn new(registry: Arc<CapabilityRegistry>, auto_accept_after: chrono::Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            registry,
            auto_accept_after,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Register a new pending task and reserve a load unit on its target.
    pub fn create(&self, task: CollaborationTask) -> SwitchboardResult<CollaborationTask> {
        if task.status != TaskStatus::Pending {
            return Err(SwitchboardError::InvalidTransition {
                task_id: task.id,
                from: task.status.to_string(),
                to: TaskStatus::Pending.to_string(),
            });
        }
        let mut tasks = self.tasks.lock();
        self.registry.adjust_load(&task.target, 1)?;
        info!(
            task_id = %task.id,
            source = %task.source,
            target = %task.target,
            priority = %task.priority,
            kind = %task.collaboration_type,
            "Task created"
        );
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub fn accept(&self, id: Uuid, feedback: Option<String>) -> SwitchboardResult<CollaborationTask> {
        self.transition(id, TaskStatus::Accepted, Utc::now(), |t| {
            if let Some(f) = feedback {
                t.feedback = Some(f);
            }
        })
    }

    pub fn reject(&self, id: Uuid, feedback: Option<String>) -> SwitchboardResult<CollaborationTask> {
        self.transition(id, TaskStatus::Rejected, Utc::now(), |t| {
            if let Some(f) = feedback {
                t.feedback = Some(f);
            }
        })
    }

    /// Cancel a pending task. Recorded as a rejection.
    pub fn cancel(&self, id: Uuid) -> SwitchboardResult<CollaborationTask> {
        self.transition(id, TaskStatus::Rejected, Utc::now(), |t| {
            t.feedback = Some("Cancelled".into());
        })
    }

    pub fn start(&self, id: Uuid) -> SwitchboardResult<CollaborationTask> {
        self.transition(id, TaskStatus::InProgress, Utc::now(), |_| {})
    }

    pub fn complete(&self, id: Uuid, result: serde_json::Value) -> SwitchboardResult<CollaborationTask> {
        self.transition(id, TaskStatus::Completed, Utc::now(), |t| {
            t.result = Some(result);
        })
    }

    pub fn fail(&self, id: Uuid, error_detail: impl Into<String>) -> SwitchboardResult<CollaborationTask> {
        let detail = error_detail.into();
        self.transition(id, TaskStatus::Failed, Utc::now(), |t| {
            t.feedback = Some(detail);
        })
    }

    /// Accept every pending low-priority delegation older than the threshold.
    /// Returns the tasks that were accepted.
    pub fn sweep_auto_accept(&self, now: DateTime<Utc>) -> Vec<CollaborationTask> {
        let mut tasks = self.tasks.lock();
        let mut accepted = Vec::new();
        for task in tasks.values_mut() {
            let stale = task.status == TaskStatus::Pending
                && task.priority == Priority::Low
                && task.collaboration_type == CollaborationType::Delegation
                && task.age_at(now) > self.auto_accept_after;
            if !stale {
                continue;
            }
            match self.apply(task, TaskStatus::Accepted, now, |t| {
                t.feedback = Some(AUTO_ACCEPT_FEEDBACK.into());
            }) {
                Ok(()) => {
                    info!(task_id = %task.id, target = %task.target, "Task auto-accepted");
                    accepted.push(task.clone());
                }
                Err(e) => warn!(task_id = %task.id, error = %e, "Auto-accept failed"),
            }
        }
        accepted
    }

    pub fn get(&self, id: Uuid) -> Option<CollaborationTask> {
        self.tasks.lock().get(&id).cloned()
    }

    /// Matching tasks, oldest first.
    pub fn list(&self, query: &TaskQuery) -> Vec<CollaborationTask> {
        let mut out: Vec<_> = self
            .tasks
            .lock()
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.requested_at);
        out
    }

    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for task in self.tasks.lock().values() {
            *counts.entry(task.status.to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    fn transition<F>(
        &self,
        id: Uuid,
        next: TaskStatus,
        now: DateTime<Utc>,
        update: F,
    ) -> SwitchboardResult<CollaborationTask>
    where
        F: FnOnce(&mut CollaborationTask),
    {
        let mut tasks = self.tasks.lock();
        let task = tasks.get_mut(&id).ok_or(SwitchboardError::TaskNotFound(id))?;
        self.apply(task, next, now, update)?;
        Ok(task.clone())
    }

    /// Validate and apply one transition. Caller holds the task table lock.
    fn apply<F>(
        &self,
        task: &mut CollaborationTask,
        next: TaskStatus,
        now: DateTime<Utc>,
        update: F,
    ) -> SwitchboardResult<()>
    where
        F: FnOnce(&mut CollaborationTask),
    {
        let from = task.status;
        if !from.can_transition_to(next) {
            warn!(task_id = %task.id, from = %from, to = %next, "Invalid task transition");
            return Err(SwitchboardError::InvalidTransition {
                task_id: task.id,
                from: from.to_string(),
                to: next.to_string(),
            });
        }

        let at = task.stamp(now);
        task.status = next;
        update(task);
        if matches!(next, TaskStatus::Accepted | TaskStatus::Rejected) && task.responded_at.is_none() {
            task.responded_at = Some(at);
        }

        if next.is_terminal() {
            if task.completed_at.is_none() {
                task.completed_at = Some(at);
            }
            let success = next == TaskStatus::Completed;
            let elapsed_ms = (at - task.requested_at).num_milliseconds().max(0) as f64;
            if let Err(e) = self.registry.release(&task.target, success, elapsed_ms) {
                warn!(task_id = %task.id, worker = %task.target, error = %e, "Load release failed");
            }
        }

        info!(task_id = %task.id, from = %from, to = %next, "Task transitioned");
        Ok(())
    }
}
