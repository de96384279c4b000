//! Detect, gate and execute in one pass over generated text.

use crate::action::ActionDescriptor;
use crate::detector::{ActionDetector, DetectionContext};
use crate::executor::{ActionExecutor, ExecutionOutcome};
use crate::gate::{ConfidenceGate, GateConfig, GateDecision};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutedAction {
    pub action: ActionDescriptor,
    pub outcome: ExecutionOutcome,
}

/// Result of [`ActionPipeline::process`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatedActions {
    /// Every action the gate let through, including ones whose execution failed.
    pub executed: Vec<ExecutedAction>,
    pub suggested: Vec<ActionDescriptor>,
    /// Input text plus failure notes and the suggested-actions block.
    pub annotated_text: String,
}

pub struct ActionPipeline {
    detector: ActionDetector,
    gate: ConfidenceGate,
    executor: Arc<dyn ActionExecutor>,
    timeout: Duration,
}

impl ActionPipeline {
    pub fn new(detector: ActionDetector, config: &GateConfig, executor: Arc<dyn ActionExecutor>) -> Self {
        Self {
            detector,
            gate: ConfidenceGate::new(config.execute_threshold),
            executor,
            timeout: Duration::from_millis(config.executor_timeout_ms),
        }
    }

    pub fn gate(&self) -> &ConfidenceGate {
        &self.gate
    }

    pub fn detector(&self) -> &ActionDetector {
        &self.detector
    }

    /// Never fails: execution errors end up in `annotated_text`.
    pub async fn process(
        &self,
        text: &str,
        context: &DetectionContext,
        payload: &serde_json::Value,
    ) -> GatedActions {
        let detection = self.detector.detect(text, context);
        let mut result = GatedActions {
            annotated_text: text.to_string(),
            ..Default::default()
        };

        for action in detection.actions {
            let decision = if context.autonomous {
                self.gate.decide(&action)
            } else {
                GateDecision::Suggest
            };
            match decision {
                GateDecision::Execute => {
                    let outcome = self.run(&action, payload).await;
                    if !outcome.success {
                        let _ = write!(
                            result.annotated_text,
                            "\n\n[Action failed: {} ({})]",
                            action.description, outcome.detail
                        );
                    }
                    result.executed.push(ExecutedAction { action, outcome });
                }
                GateDecision::Suggest => {
                    info!(
                        action_id = %action.id,
                        kind = %action.kind,
                        reason = %self.gate.explain(&action).unwrap_or_else(|| "autonomy disabled".into()),
                        "Action downgraded to suggestion"
                    );
                    result.suggested.push(action);
                }
            }
        }

        if !result.suggested.is_empty() {
            result.annotated_text.push_str("\n\nSuggested actions:");
            for action in &result.suggested {
                let _ = write!(
                    result.annotated_text,
                    "\n- {} (risk: {}, estimated time: {}{})",
                    action.description,
                    action.risk_level,
                    if action.estimated_time.is_empty() { "unknown" } else { action.estimated_time.as_str() },
                    if action.requires_confirmation { ", requires confirmation" } else { "" }
                );
            }
        }

        result
    }

    async fn run(&self, action: &ActionDescriptor, payload: &serde_json::Value) -> ExecutionOutcome {
        match tokio::time::timeout(self.timeout, self.executor.execute(action, payload)).await {
            Ok(Ok(outcome)) => {
                if outcome.success {
                    info!(action_id = %action.id, kind = %action.kind, "Action executed");
                } else {
                    warn!(action_id = %action.id, kind = %action.kind, detail = %outcome.detail, "Action reported failure");
                }
                outcome
            }
            Ok(Err(e)) => {
                warn!(action_id = %action.id, kind = %action.kind, error = %e, "Action execution failed");
                ExecutionOutcome::failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    action_id = %action.id,
                    kind = %action.kind,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Action execution timed out"
                );
                ExecutionOutcome::failed(format!("timed out after {}ms", self.timeout.as_millis()))
            }
        }
    }
}
