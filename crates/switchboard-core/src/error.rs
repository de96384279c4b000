use thiserror::Error;
use uuid::Uuid;

/// A convenience `Result` alias using [`SwitchboardError`].
pub type SwitchboardResult<T> = Result<T, SwitchboardError>;

/// Top-level error type for the Switchboard engine.
///
/// Routing and classification errors are returned synchronously to callers.
/// Execution-time errors are folded into task state by the lifecycle manager
/// and only surface here when a caller asked for them directly.
#[derive(Error, Debug)]
pub enum SwitchboardError {
    /// The target worker has no free slot.
    #[error("Capacity exceeded for worker '{worker}' ({current}/{max})")]
    CapacityExceeded {
        /// Worker that rejected the reservation.
        worker: String,
        /// Load at the time of the rejection.
        current: u32,
        /// Configured concurrency limit.
        max: u32,
    },

    /// No worker covers the requested capabilities.
    #[error("No eligible worker for capabilities {0:?}")]
    NoEligibleWorker(Vec<String>),

    /// A task state transition that the state machine does not allow.
    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        /// Task the transition was attempted on.
        task_id: Uuid,
        /// Status the task was in.
        from: String,
        /// Status the caller asked for.
        to: String,
    },

    /// A worker id that is not registered.
    #[error("Unknown worker: {0}")]
    UnknownWorker(String),

    /// A task id that is not known to the lifecycle manager.
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// A completion or action-execution call failed or timed out.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// The datastore rejected a write or read.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration parsing or validation failed.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SwitchboardError {
    /// Stable snake_case tag, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SwitchboardError::CapacityExceeded { .. } => "capacity_exceeded",
            SwitchboardError::NoEligibleWorker(_) => "no_eligible_worker",
            SwitchboardError::InvalidTransition { .. } => "invalid_transition",
            SwitchboardError::UnknownWorker(_) => "unknown_worker",
            SwitchboardError::TaskNotFound(_) => "task_not_found",
            SwitchboardError::Upstream(_) => "upstream",
            SwitchboardError::Persistence(_) => "persistence",
            SwitchboardError::Config(_) => "config",
            SwitchboardError::Json(_) => "json",
            SwitchboardError::Io(_) => "io",
        }
    }

    /// Whether a datastore write that failed with this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwitchboardError::Persistence(_) | SwitchboardError::Io(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_capacity() {
        let err = SwitchboardError::CapacityExceeded {
            worker: "billing".into(),
            current: 2,
            max: 2,
        };
        assert_eq!(err.to_string(), "Capacity exceeded for worker 'billing' (2/2)");
        assert_eq!(err.kind(), "capacity_exceeded");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SwitchboardError::Persistence("disk full".into()).is_retryable());
        assert!(SwitchboardError::Io(std::io::Error::other("eio")).is_retryable());
        assert!(!SwitchboardError::Upstream("503".into()).is_retryable());
        assert!(!SwitchboardError::Config("bad".into()).is_retryable());
    }
}
