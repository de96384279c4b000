//! Seams to the services a worker runs on.
//!
//! The engine never talks to a model provider directly: it hands a
//! [`WorkerRequest`] to a [`WorkerHandler`], which usually fronts one or more
//! [`CompletionService`]s.

use crate::task::WorkerId;
use crate::SwitchboardResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Output of a single completion call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
    pub latency_ms: u64,
}

/// Opaque language-model completion backend.
///
/// Implementations return [`SwitchboardError::Upstream`](crate::SwitchboardError::Upstream)
/// on non-2xx responses and timeouts.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        context: &serde_json::Value,
    ) -> SwitchboardResult<Completion>;
}

/// Why an earlier attempt in a fallback chain did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorFailure {
    pub worker: WorkerId,
    pub reason: String,
}

/// A request dispatched to one worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub message: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Failures of the attempts that preceded this one, oldest first.
    #[serde(default)]
    pub prior_failures: Vec<PriorFailure>,
}

impl WorkerRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: serde_json::Value::Null,
            prior_failures: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// A copy of this request annotated with one more failed attempt.
    pub fn after_failure(&self, worker: &str, reason: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.prior_failures.push(PriorFailure {
            worker: worker.to_string(),
            reason: reason.into(),
        });
        next
    }
}

/// What a worker handed back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerResponse {
    /// Explicit failure flag; `false` is treated like an error by the fallback bridge.
    pub success: bool,
    pub content: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub latency_ms: u64,
}

impl WorkerResponse {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            success: true,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Runs a request on a named worker.
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    async fn handle(&self, worker: &str, request: &WorkerRequest)
        -> SwitchboardResult<WorkerResponse>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_after_failure_accumulates() {
        let req = WorkerRequest::new("summarize").with_payload(serde_json::json!({"doc": 1}));
        let second = req.after_failure("a", "timeout");
        let third = second.after_failure("b", "503");
        assert!(req.prior_failures.is_empty());
        assert_eq!(third.prior_failures.len(), 2);
        assert_eq!(third.prior_failures[1].worker, "b");
        assert_eq!(third.payload, serde_json::json!({"doc": 1}));
    }

    #[test]
    fn test_response_constructors() {
        assert!(WorkerResponse::ok("done").success);
        let failed = WorkerResponse::failed("quota");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("quota"));
    }
}
