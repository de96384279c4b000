//! The engine facade: the public surface callers and the CLI use.
//!
//! Routing (registry, classifier, scorer), the task lifecycle, the fallback
//! bridge and the action pipeline are owned here and wired together
//! explicitly. Nothing starts until [`Engine::initialize`] is called.

use crate::config::EngineConfig;
use crate::fallback::{BridgeResponse, FallbackBridge, ALL_UNAVAILABLE_MESSAGE};
use crate::lifecycle::LifecycleManager;
use crate::persister::{bounded, Persister};
use crate::store::open_store;
use crate::sweep::AutoAcceptSweeper;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_actions::{
    default_templates, ActionDetector, ActionExecutor, ActionPipeline, ActionTemplate, DetectionContext,
    DryRunExecutor, GatedActions,
};
use switchboard_core::{
    CollaborationTask, CollaborationType, Priority, SwitchboardError, SwitchboardResult, TaskQuery, TaskStore,
    WorkerHandler, WorkerId, WorkerRequest,
};
use switchboard_routing::{
    CapabilityProfile, CapabilityRegistry, Classification, RequestClassifier, SelectionScorer,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A delegation request handed to [`Engine::submit_task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSubmission {
    pub source: WorkerId,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_collaboration_type")]
    pub collaboration_type: CollaborationType,
    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_collaboration_type() -> CollaborationType {
    CollaborationType::Delegation
}

impl TaskSubmission {
    pub fn new(source: impl Into<WorkerId>, description: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            required_capabilities: Vec::new(),
            description: description.into(),
            priority: Priority::Medium,
            collaboration_type: default_collaboration_type(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = caps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_type(mut self, collaboration_type: CollaborationType) -> Self {
        self.collaboration_type = collaboration_type;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// A target worker's answer to a pending task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

/// Final task record plus what the bridge returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecution {
    pub task: CollaborationTask,
    pub response: BridgeResponse,
}

/// Input to [`Engine::process_request`].
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub message: String,
    pub attachment_types: Vec<String>,
    pub source: WorkerId,
    pub priority: Priority,
    pub payload: serde_json::Value,
    pub context: DetectionContext,
}

impl ProcessRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            attachment_types: Vec::new(),
            source: "requester".into(),
            priority: Priority::Medium,
            payload: serde_json::Value::Null,
            context: DetectionContext::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<WorkerId>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attachments<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attachment_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_context(mut self, context: DetectionContext) -> Self {
        self.context = context;
        self
    }
}

/// Everything [`Engine::process_request`] produced for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub classification: Classification,
    pub task: CollaborationTask,
    pub response: BridgeResponse,
    /// Empty apart from `annotated_text` when execution failed.
    pub actions: GatedActions,
}

impl ProcessOutcome {
    /// Text to show the requester.
    pub fn output(&self) -> &str {
        &self.actions.annotated_text
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    handler: Option<Arc<dyn WorkerHandler>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    store: Option<Arc<dyn TaskStore>>,
    templates: Option<Vec<ActionTemplate>>,
}

impl EngineBuilder {
    /// Worker handler every task and fallback attempt is dispatched to. Required.
    pub fn with_handler(mut self, handler: Arc<dyn WorkerHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Executor for gated actions. Defaults to [`DryRunExecutor`].
    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Overrides the store selected by `[persistence]`.
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_action_templates(mut self, templates: Vec<ActionTemplate>) -> Self {
        self.templates = Some(templates);
        self
    }

    pub fn build(self) -> SwitchboardResult<Engine> {
        self.config.validate()?;
        let handler = self
            .handler
            .ok_or_else(|| SwitchboardError::Config("A worker handler is required".into()))?;
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(DryRunExecutor) as Arc<dyn ActionExecutor>);

        let auto_accept_after = chrono::Duration::from_std(Duration::from_secs(
            self.config.lifecycle.auto_accept_after_secs,
        ))
        .map_err(|e| SwitchboardError::Config(format!("lifecycle.auto_accept_after_secs: {e}")))?;

        let registry = Arc::new(CapabilityRegistry::with_ema_weight(self.config.registry.ema_weight));
        let lifecycle = Arc::new(LifecycleManager::new(registry.clone(), auto_accept_after));
        let bridge = FallbackBridge::new(
            handler,
            Duration::from_millis(self.config.fallback.attempt_timeout_ms),
        )
        .with_registry(registry.clone());
        let detector = ActionDetector::new(self.templates.unwrap_or_else(default_templates));
        let actions = ActionPipeline::new(detector, &self.config.gate, executor);

        Ok(Engine {
            classifier: RequestClassifier::new(self.config.classifier.clone()),
            scorer: SelectionScorer::new(self.config.scoring),
            registry,
            lifecycle,
            bridge,
            actions,
            store: self.store,
            started: AtomicBool::new(false),
            running: Mutex::new(None),
            config: self.config,
        })
    }
}

/// Background pieces owned by an initialized engine.
struct Running {
    store: Arc<dyn TaskStore>,
    persister: Persister,
    writer: JoinHandle<()>,
    sweeper: AutoAcceptSweeper,
}

pub struct Engine {
    config: EngineConfig,
    registry: Arc<CapabilityRegistry>,
    classifier: RequestClassifier,
    scorer: SelectionScorer,
    lifecycle: Arc<LifecycleManager>,
    bridge: FallbackBridge,
    actions: ActionPipeline,
    store: Option<Arc<dyn TaskStore>>,
    started: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            handler: None,
            executor: None,
            store: None,
            templates: None,
        }
    }

    /// Register the configured workers, open the store and start the
    /// persister and the auto-accept sweeper. Fails if called twice.
    pub async fn initialize(&self) -> SwitchboardResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SwitchboardError::Config("Engine is already initialized".into()));
        }

        for worker in &self.config.workers {
            self.registry.register(worker.to_profile())?;
        }

        let store = match &self.store {
            Some(store) => store.clone(),
            None => open_store(&self.config.persistence).await?,
        };
        let (persister, writer) = Persister::spawn(
            store.clone(),
            self.config.persistence.max_retries,
            Duration::from_millis(self.config.persistence.retry_interval_ms),
            Duration::from_millis(self.config.persistence.timeout_ms),
        );
        let sweeper = AutoAcceptSweeper::spawn(
            self.lifecycle.clone(),
            persister.clone(),
            Duration::from_secs(self.config.lifecycle.sweep_interval_secs),
        );

        *self.running.lock() = Some(Running {
            store,
            persister,
            writer,
            sweeper,
        });
        info!(
            workers = self.registry.len(),
            backend = ?self.config.persistence.backend,
            "Engine initialized"
        );
        Ok(())
    }

    /// Stop the sweeper and drain pending writes. Idempotent.
    pub async fn shutdown(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        running.sweeper.stop().await;
        running.persister.flush().await;
        drop(running.persister);
        if let Err(e) = running.writer.await {
            warn!(error = %e, "Persister task ended abnormally");
        }
        info!("Engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    // --- Routing ---

    pub fn classify_request(&self, message: &str, attachment_types: &[String]) -> Classification {
        self.classifier.classify(message, attachment_types)
    }

    /// Route a new delegation to the best eligible worker and reserve a slot.
    ///
    /// The source never receives its own task. Candidates are tried in rank
    /// order, so losing a reservation race to a concurrent submit falls
    /// through to the next one.
    pub fn submit_task(&self, submission: TaskSubmission) -> SwitchboardResult<CollaborationTask> {
        let required = &submission.required_capabilities;
        let eligible: Vec<CapabilityProfile> = self
            .registry
            .list_eligible(required)
            .into_iter()
            .filter(|p| p.worker_id != submission.source)
            .collect();
        if eligible.is_empty() {
            return Err(self.no_room(required, &submission.source));
        }

        let decision = self.scorer.rank(&eligible, required, submission.priority);
        for candidate in &decision.candidates {
            let task = CollaborationTask::new(
                submission.source.clone(),
                candidate.worker_id.clone(),
                submission.collaboration_type,
                submission.description.clone(),
            )
            .with_priority(submission.priority)
            .with_payload(submission.payload.clone())
            .with_metadata("required_capabilities", serde_json::json!(required))
            .with_metadata("routing_confidence", serde_json::json!(decision.confidence))
            .with_metadata("routing_reasoning", serde_json::json!(decision.reasoning));

            match self.lifecycle.create(task) {
                Ok(task) => {
                    self.persist(|p| p.record_insert(task.clone()));
                    return Ok(task);
                }
                Err(SwitchboardError::CapacityExceeded { worker, .. }) => {
                    debug!(worker = %worker, "Worker filled up during routing, trying next candidate");
                }
                Err(e) => return Err(e),
            }
        }
        Err(self.no_room(required, &submission.source))
    }

    fn no_room(&self, required: &[String], source: &str) -> SwitchboardError {
        match self.registry.any_capable(required, Some(source)) {
            Some(busy) => {
                warn!(
                    worker = %busy.worker_id,
                    load = busy.current_load,
                    max = busy.max_concurrent,
                    "Capacity exceeded for every capable worker"
                );
                SwitchboardError::CapacityExceeded {
                    worker: busy.worker_id,
                    current: busy.current_load,
                    max: busy.max_concurrent,
                }
            }
            None => {
                warn!(capabilities = ?required, "No eligible worker");
                SwitchboardError::NoEligibleWorker(required.to_vec())
            }
        }
    }

    // --- Lifecycle ---

    pub fn respond(&self, id: Uuid, decision: Decision, feedback: Option<String>) -> SwitchboardResult<CollaborationTask> {
        let task = match decision {
            Decision::Accept => self.lifecycle.accept(id, feedback)?,
            Decision::Reject => self.lifecycle.reject(id, feedback)?,
        };
        self.persist(|p| p.record_update(task.clone()));
        Ok(task)
    }

    pub fn complete(&self, id: Uuid, result: serde_json::Value) -> SwitchboardResult<CollaborationTask> {
        let task = self.lifecycle.complete(id, result)?;
        self.persist(|p| p.record_update(task.clone()));
        Ok(task)
    }

    pub fn fail(&self, id: Uuid, error_detail: impl Into<String>) -> SwitchboardResult<CollaborationTask> {
        let task = self.lifecycle.fail(id, error_detail)?;
        self.persist(|p| p.record_update(task.clone()));
        Ok(task)
    }

    /// Cancel a pending task. In-flight tasks are left to finish.
    pub fn cancel(&self, id: Uuid) -> SwitchboardResult<CollaborationTask> {
        let task = self.lifecycle.cancel(id)?;
        self.persist(|p| p.record_update(task.clone()));
        Ok(task)
    }

    /// Run an accepted task on its target, falling back along the configured
    /// chain. Execution failures end the task as `failed`; they are not
    /// returned as errors.
    ///
    /// The target keeps the task's load unit for the whole run. Fallback
    /// workers that are offline or full are skipped.
    pub async fn execute_task(&self, id: Uuid) -> SwitchboardResult<TaskExecution> {
        let task = self.lifecycle.start(id)?;
        self.persist(|p| p.record_update(task.clone()));

        let request = WorkerRequest::new(task.description.clone()).with_payload(task.payload.clone());
        let chain = self
            .config
            .fallback
            .chains
            .get(&task.target)
            .cloned()
            .unwrap_or_default();
        let response = self.bridge.route_reserved(&task.target, &chain, &request).await;

        let finished = if response.success {
            self.lifecycle.complete(
                id,
                serde_json::json!({
                    "content": response.content,
                    "worker": response.worker,
                    "fallback_used": response.fallback_used,
                    "tokens_used": response.tokens_used,
                    "latency_ms": response.latency_ms,
                }),
            )
        } else {
            let summary = response.failure_summary();
            let detail = if summary.is_empty() {
                ALL_UNAVAILABLE_MESSAGE.to_string()
            } else {
                summary
            };
            self.lifecycle.fail(id, detail)
        };

        let task = match finished {
            Ok(task) => {
                self.persist(|p| p.record_update(task.clone()));
                task
            }
            // Someone else ended the task while the worker was running.
            Err(SwitchboardError::InvalidTransition { from, .. }) => {
                warn!(
                    task_id = %id,
                    status = %from,
                    success = response.success,
                    "Task finished elsewhere during execution; keeping its final state"
                );
                self.lifecycle.get(id).ok_or(SwitchboardError::TaskNotFound(id))?
            }
            Err(e) => return Err(e),
        };
        Ok(TaskExecution { task, response })
    }

    // --- Dispatch and actions ---

    pub async fn route_with_fallback(
        &self,
        primary: &str,
        fallbacks: &[WorkerId],
        request: &WorkerRequest,
    ) -> BridgeResponse {
        self.bridge.route_with_fallback(primary, fallbacks, request).await
    }

    pub async fn detect_and_gate_actions(
        &self,
        text: &str,
        context: &DetectionContext,
        payload: &serde_json::Value,
    ) -> GatedActions {
        self.actions.process(text, context, payload).await
    }

    /// Classify, route, accept, execute, then gate any actions in the answer.
    ///
    /// Routing errors are returned. Once a task exists the call succeeds even
    /// if every worker failed; the task is then `failed` and the output is the
    /// unavailability message.
    pub async fn process_request(&self, request: ProcessRequest) -> SwitchboardResult<ProcessOutcome> {
        let classification = self.classify_request(&request.message, &request.attachment_types);
        info!(
            request_type = %classification.request_type,
            confidence = classification.confidence,
            "Request classified"
        );

        let submission = TaskSubmission::new(request.source.clone(), request.message.clone())
            .with_capabilities(classification.required_capabilities.iter().cloned())
            .with_priority(request.priority)
            .with_payload(request.payload.clone());
        let task = self.submit_task(submission)?;
        self.respond(task.id, Decision::Accept, None)?;
        let execution = self.execute_task(task.id).await?;

        let actions = if execution.response.success {
            self.detect_and_gate_actions(&execution.response.content, &request.context, &request.payload)
                .await
        } else {
            GatedActions {
                annotated_text: execution.response.content.clone(),
                ..Default::default()
            }
        };

        Ok(ProcessOutcome {
            classification,
            task: execution.task,
            response: execution.response,
            actions,
        })
    }

    // --- Queries ---

    pub fn task(&self, id: Uuid) -> Option<CollaborationTask> {
        self.lifecycle.get(id)
    }

    pub fn tasks(&self, query: &TaskQuery) -> Vec<CollaborationTask> {
        self.lifecycle.list(query)
    }

    /// Ask the datastore rather than the in-memory table.
    pub async fn stored_tasks(&self, query: &TaskQuery) -> SwitchboardResult<Vec<CollaborationTask>> {
        let store = self
            .running
            .lock()
            .as_ref()
            .map(|r| r.store.clone())
            .ok_or_else(|| SwitchboardError::Config("Engine is not initialized".into()))?;
        let timeout = Duration::from_millis(self.config.persistence.timeout_ms);
        bounded(timeout, "query", store.query(query)).await
    }

    /// Wait for queued task writes to be attempted.
    pub async fn flush(&self) {
        let persister = self.running.lock().as_ref().map(|r| r.persister.clone());
        if let Some(persister) = persister {
            persister.flush().await;
        }
    }

    pub fn workers(&self) -> Vec<CapabilityProfile> {
        self.registry.list()
    }

    pub fn set_worker_offline(&self, worker: &str, offline: bool) -> SwitchboardResult<()> {
        self.registry.set_offline(worker, offline)
    }

    /// Dashboard snapshot of workers, tasks and persistence.
    pub fn status_json(&self) -> serde_json::Value {
        let (running, sweeper_running, persistence) = match self.running.lock().as_ref() {
            Some(r) => (
                true,
                r.sweeper.is_running(),
                serde_json::to_value(r.persister.stats()).unwrap_or(serde_json::Value::Null),
            ),
            None => (false, false, serde_json::Value::Null),
        };
        serde_json::json!({
            "running": running,
            "sweeper_running": sweeper_running,
            "workers": self.registry.to_json(),
            "tasks": {
                "total": self.lifecycle.len(),
                "by_status": self.lifecycle.status_counts(),
            },
            "persistence": persistence,
        })
    }

    fn persist(&self, write: impl FnOnce(&Persister)) {
        match self.running.lock().as_ref() {
            Some(r) => write(&r.persister),
            None => debug!("Engine not running; task not persisted"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use switchboard_agent::{CompletionHandler, EchoCompletionService};
    use switchboard_core::TaskStatus;

    fn engine() -> Engine {
        let config = EngineConfig::default()
            .with_worker(WorkerConfig::new("billing", 2).with_capabilities(&["billing"]))
            .with_worker(WorkerConfig::new("support", 2).with_capabilities(&["technical_support"]));
        let handler = CompletionHandler::new()
            .with_service("billing", Arc::new(EchoCompletionService::new("billing")))
            .with_service("support", Arc::new(EchoCompletionService::new("support")));
        Engine::builder(config).with_handler(Arc::new(handler)).build().unwrap()
    }

    #[test]
    fn test_build_requires_handler() {
        let err = Engine::builder(EngineConfig::default()).build().err().unwrap();
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn test_initialize_twice_fails() {
        let e = engine();
        e.initialize().await.unwrap();
        assert!(e.initialize().await.is_err());
        assert_eq!(e.workers().len(), 2);
        e.shutdown().await;
        assert!(!e.is_running());
    }

    #[tokio::test]
    async fn test_submit_routes_by_capability_and_skips_source() {
        let e = engine();
        e.initialize().await.unwrap();

        let task = e
            .submit_task(TaskSubmission::new("support", "refund please").with_capabilities(["billing"]))
            .unwrap();
        assert_eq!(task.target, "billing");
        assert!(task.metadata.contains_key("routing_reasoning"));

        // A worker never delegates to itself.
        let err = e
            .submit_task(TaskSubmission::new("billing", "refund").with_capabilities(["billing"]))
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::NoEligibleWorker(_)));
        e.shutdown().await;
    }

    #[tokio::test]
    async fn test_execute_completes_with_echo() {
        let e = engine();
        e.initialize().await.unwrap();
        let task = e
            .submit_task(TaskSubmission::new("triage", "check invoice").with_capabilities(["billing"]))
            .unwrap();
        e.respond(task.id, Decision::Accept, None).unwrap();
        let run = e.execute_task(task.id).await.unwrap();
        assert!(run.response.success);
        assert_eq!(run.task.status, TaskStatus::Completed);
        assert_eq!(run.task.result.unwrap()["content"], "[billing] check invoice");
        assert_eq!(e.registry().get("billing").unwrap().current_load, 0);
        e.shutdown().await;
    }

    #[tokio::test]
    async fn test_status_json_counts() {
        let e = engine();
        e.initialize().await.unwrap();
        e.submit_task(TaskSubmission::new("triage", "x")).unwrap();
        let status = e.status_json();
        assert_eq!(status["running"], true);
        assert_eq!(status["tasks"]["total"], 1);
        assert_eq!(status["tasks"]["by_status"]["pending"], 1);
        assert_eq!(status["workers"].as_array().unwrap().len(), 2);
        e.shutdown().await;
    }
}
