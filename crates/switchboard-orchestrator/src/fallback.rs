//! Ordered retry across alternate workers.
//!
//! The primary target is tried first, then each fallback in order. A target
//! appears at most once in a chain, and every attempt is bounded by a timeout.
//! With a registry attached, offline workers are skipped and each registered
//! worker holds one load unit for the length of its attempt.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchboard_core::{SwitchboardError, WorkerHandler, WorkerId, WorkerRequest};
use switchboard_routing::CapabilityRegistry;
use tracing::{info, warn};

/// Content returned when every attempt failed.
pub const ALL_UNAVAILABLE_MESSAGE: &str = "All workers are currently unavailable. Please try again later.";

/// One attempt in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub worker: WorkerId,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    pub latency_ms: u64,
    /// The worker was passed over without being called.
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub success: bool,
    /// Worker that produced `content`; `None` on total failure.
    pub worker: Option<WorkerId>,
    pub content: String,
    /// True when a worker other than the primary answered.
    pub fallback_used: bool,
    pub attempts: Vec<AttemptRecord>,
    pub tokens_used: u64,
    /// Wall time across every attempt.
    pub latency_ms: u64,
}

impl BridgeResponse {
    /// Failure reasons joined for task feedback.
    pub fn failure_summary(&self) -> String {
        self.attempts
            .iter()
            .filter(|a| !a.success)
            .map(|a| format!("{}: {}", a.worker, a.error.as_deref().unwrap_or("failed")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// How a target may be dispatched.
enum Admission {
    /// One load unit was taken and must be given back after the attempt.
    Reserved,
    /// No accounting: unregistered worker, or the caller already holds a unit.
    Unmetered,
    Skipped(String),
}

pub struct FallbackBridge {
    handler: Arc<dyn WorkerHandler>,
    attempt_timeout: Duration,
    registry: Option<Arc<CapabilityRegistry>>,
}

impl FallbackBridge {
    pub fn new(handler: Arc<dyn WorkerHandler>, attempt_timeout: Duration) -> Self {
        Self {
            handler,
            attempt_timeout,
            registry: None,
        }
    }

    /// Gate attempts on availability and capacity in `registry`.
    pub fn with_registry(mut self, registry: Arc<CapabilityRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub async fn route_with_fallback(
        &self,
        primary: &str,
        fallbacks: &[WorkerId],
        request: &WorkerRequest,
    ) -> BridgeResponse {
        self.dispatch(primary, false, fallbacks, request).await
    }

    /// Like [`route_with_fallback`](Self::route_with_fallback) for a primary
    /// that already holds a load unit, such as a task's target.
    pub async fn route_reserved(
        &self,
        primary: &str,
        fallbacks: &[WorkerId],
        request: &WorkerRequest,
    ) -> BridgeResponse {
        self.dispatch(primary, true, fallbacks, request).await
    }

    fn admit(&self, worker: &str, held: bool) -> Admission {
        let Some(registry) = &self.registry else {
            return Admission::Unmetered;
        };
        let Some(profile) = registry.get(worker) else {
            return Admission::Unmetered;
        };
        if profile.offline {
            return Admission::Skipped("worker is offline".into());
        }
        if held {
            return Admission::Unmetered;
        }
        match registry.adjust_load(worker, 1) {
            Ok(_) => Admission::Reserved,
            Err(SwitchboardError::CapacityExceeded { current, max, .. }) => {
                Admission::Skipped(format!("worker at capacity ({current}/{max})"))
            }
            Err(e) => Admission::Skipped(e.to_string()),
        }
    }

    fn give_back(&self, worker: &str) {
        if let Some(registry) = &self.registry {
            if let Err(e) = registry.adjust_load(worker, -1) {
                warn!(worker = %worker, error = %e, "Failed to release attempt reservation");
            }
        }
    }

    async fn dispatch(
        &self,
        primary: &str,
        primary_held: bool,
        fallbacks: &[WorkerId],
        request: &WorkerRequest,
    ) -> BridgeResponse {
        let started = Instant::now();
        let mut seen = HashSet::new();
        let targets: Vec<&str> = std::iter::once(primary)
            .chain(fallbacks.iter().map(String::as_str))
            .filter(|w| seen.insert(*w))
            .collect();

        let mut attempts = Vec::with_capacity(targets.len());
        let mut current = request.clone();

        for worker in targets {
            let admission = self.admit(worker, primary_held && worker == primary);
            if let Admission::Skipped(reason) = &admission {
                info!(worker = %worker, reason = %reason, "Skipping worker");
                attempts.push(AttemptRecord {
                    worker: worker.to_string(),
                    success: false,
                    error: Some(reason.clone()),
                    latency_ms: 0,
                    skipped: true,
                });
                continue;
            }

            let attempt_started = Instant::now();
            let outcome = tokio::time::timeout(self.attempt_timeout, self.handler.handle(worker, &current)).await;
            let latency_ms = attempt_started.elapsed().as_millis() as u64;
            if matches!(admission, Admission::Reserved) {
                self.give_back(worker);
            }

            let reason = match outcome {
                Ok(Ok(resp)) if resp.success => {
                    attempts.push(AttemptRecord {
                        worker: worker.to_string(),
                        success: true,
                        error: None,
                        latency_ms,
                        skipped: false,
                    });
                    let fallback_used = worker != primary;
                    if fallback_used {
                        info!(primary = %primary, worker = %worker, attempts = attempts.len(), "Fallback worker answered");
                    }
                    return BridgeResponse {
                        success: true,
                        worker: Some(worker.to_string()),
                        content: resp.content,
                        fallback_used,
                        attempts,
                        tokens_used: resp.tokens_used,
                        latency_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Ok(Ok(resp)) => resp.error.unwrap_or_else(|| "worker reported failure".into()),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {}ms", self.attempt_timeout.as_millis()),
            };

            warn!(worker = %worker, error = %reason, "Worker attempt failed");
            current = current.after_failure(worker, reason.clone());
            attempts.push(AttemptRecord {
                worker: worker.to_string(),
                success: false,
                error: Some(reason),
                latency_ms,
                skipped: false,
            });
        }

        warn!(primary = %primary, attempts = attempts.len(), "All workers failed");
        BridgeResponse {
            success: false,
            worker: None,
            content: ALL_UNAVAILABLE_MESSAGE.to_string(),
            fallback_used: attempts.len() > 1,
            attempts,
            tokens_used: 0,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}
