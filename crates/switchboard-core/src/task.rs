use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Identifier of a worker (agent) in the registry.
pub type WorkerId = String;

/// Request priority. Ordered from least to most pressing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Lenient parser for CLI and config input. Unknown values map to `Medium`.
    pub fn parse_level(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Medium,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Urgent => write!(f, "urgent"),
        }
    }
}

/// Kind of collaboration between a source and a target worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationType {
    /// The source hands the entire task to the target.
    Delegation,
    Consultation,
    DataSharing,
    JointTask,
}

impl std::fmt::Display for CollaborationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollaborationType::Delegation => write!(f, "delegation"),
            CollaborationType::Consultation => write!(f, "consultation"),
            CollaborationType::DataSharing => write!(f, "data_sharing"),
            CollaborationType::JointTask => write!(f, "joint_task"),
        }
    }
}

/// Lifecycle status of a [`CollaborationTask`].
///
/// ```text
/// pending ──► accepted ──► in_progress ──► completed
///    │                          └────────► failed
///    └──────► rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Rejected,
    Failed,
}

impl TaskStatus {
    /// `completed`, `rejected` and `failed` admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Rejected | TaskStatus::Failed
        )
    }

    /// The full transition table. Nothing else decides legality.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Accepted)
                | (TaskStatus::Pending, TaskStatus::Rejected)
                | (TaskStatus::Accepted, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Accepted => write!(f, "accepted"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Rejected => write!(f, "rejected"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One delegated request between two workers.
///
/// Only the lifecycle manager mutates tasks; once `status` is terminal the
/// record is frozen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationTask {
    pub id: Uuid,
    pub source: WorkerId,
    pub target: WorkerId,
    #[serde(rename = "type")]
    pub collaboration_type: CollaborationType,
    pub description: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub status: TaskStatus,
    /// Set only on completion.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Set on acceptance, rejection and failure.
    #[serde(default)]
    pub feedback: Option<String>,
    pub requested_at: DateTime<Utc>,
    #[serde(default)]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Free-form annotations such as required capabilities or a deadline.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CollaborationTask {
    pub fn new(
        source: impl Into<WorkerId>,
        target: impl Into<WorkerId>,
        collaboration_type: CollaborationType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            target: target.into(),
            collaboration_type,
            description: description.into(),
            payload: serde_json::Value::Null,
            priority: Priority::Medium,
            status: TaskStatus::Pending,
            result: None,
            feedback: None,
            requested_at: Utc::now(),
            responded_at: None,
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Age of the request at `now`, never negative.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.requested_at).max(chrono::Duration::zero())
    }

    /// Clamp a timestamp so that it never precedes `requested_at`.
    pub fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.requested_at)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Accepted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Rejected,
        TaskStatus::Failed,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn test_transition_table() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Accepted));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Rejected));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::Accepted.can_transition_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Accepted.can_transition_to(TaskStatus::Rejected));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Completed));
        assert!(TaskStatus::InProgress.can_transition_to(TaskStatus::Failed));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: TaskStatus = serde_json::from_str("\"rejected\"").unwrap();
        assert_eq!(parsed, TaskStatus::Rejected);
    }

    #[test]
    fn test_priority_ordering_and_parse() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::Low < Priority::Medium);
        assert_eq!(Priority::parse_level("URGENT"), Priority::Urgent);
        assert_eq!(Priority::parse_level("whatever"), Priority::Medium);
    }

    #[test]
    fn test_task_builder() {
        let task = CollaborationTask::new("triage", "billing", CollaborationType::Delegation, "Refund")
            .with_priority(Priority::Low)
            .with_metadata("deadline", serde_json::json!("2026-01-01T00:00:00Z"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::Low);
        assert!(task.metadata.contains_key("deadline"));
        assert!(task.result.is_none());
    }

    #[test]
    fn test_stamp_never_precedes_request() {
        let task = CollaborationTask::new("a", "b", CollaborationType::Consultation, "x");
        let earlier = task.requested_at - chrono::Duration::seconds(5);
        assert_eq!(task.stamp(earlier), task.requested_at);
        assert_eq!(task.age_at(earlier), chrono::Duration::zero());
    }

    #[test]
    fn test_task_type_field_renamed() {
        let task = CollaborationTask::new("a", "b", CollaborationType::JointTask, "x");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "joint_task");
    }
}
