use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use switchboard_core::{
    Completion, CompletionService, SwitchboardError, SwitchboardResult, WorkerHandler, WorkerId,
    WorkerRequest, WorkerResponse,
};
use tracing::{debug, info};

/// Routes each worker id to the completion service that backs it.
#[derive(Default)]
pub struct CompletionHandler {
    services: HashMap<WorkerId, Arc<dyn CompletionService>>,
}

impl CompletionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, worker: impl Into<WorkerId>, service: Arc<dyn CompletionService>) -> Self {
        self.insert(worker, service);
        self
    }

    pub fn insert(&mut self, worker: impl Into<WorkerId>, service: Arc<dyn CompletionService>) {
        self.services.insert(worker.into(), service);
    }

    pub fn has_worker(&self, worker: &str) -> bool {
        self.services.contains_key(worker)
    }

    pub fn workers(&self) -> Vec<WorkerId> {
        let mut ids: Vec<_> = self.services.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// The request message plus a summary of earlier failed attempts.
pub fn render_prompt(request: &WorkerRequest) -> String {
    let mut prompt = request.message.clone();
    if !request.prior_failures.is_empty() {
        prompt.push_str("\n\nPrevious attempts failed:");
        for failure in &request.prior_failures {
            let _ = write!(prompt, "\n- {}: {}", failure.worker, failure.reason);
        }
    }
    prompt
}

#[async_trait]
impl WorkerHandler for CompletionHandler {
    async fn handle(&self, worker: &str, request: &WorkerRequest) -> SwitchboardResult<WorkerResponse> {
        let service = self
            .services
            .get(worker)
            .ok_or_else(|| SwitchboardError::Upstream(format!("no completion backend for worker '{worker}'")))?;

        let context = serde_json::json!({
            "worker": worker,
            "payload": request.payload,
            "prior_failures": request.prior_failures,
        });
        debug!(worker = %worker, retries = request.prior_failures.len(), "Dispatching to completion service");
        let Completion {
            text,
            tokens_used,
            latency_ms,
        } = service.complete(&render_prompt(request), &context).await?;

        Ok(WorkerResponse {
            success: true,
            content: text,
            error: None,
            tokens_used,
            latency_ms,
        })
    }
}

/// Completion service that echoes the prompt back. Used when a worker has no
/// backend configured, so the engine can be exercised offline.
pub struct EchoCompletionService {
    name: String,
}

impl EchoCompletionService {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl CompletionService for EchoCompletionService {
    async fn complete(&self, prompt: &str, _context: &serde_json::Value) -> SwitchboardResult<Completion> {
        info!(worker = %self.name, "Echo backend handling request");
        let first_line = prompt.lines().next().unwrap_or_default();
        Ok(Completion {
            text: format!("[{}] {}", self.name, first_line),
            tokens_used: prompt.split_whitespace().count() as u64,
            latency_ms: 0,
        })
    }
}
