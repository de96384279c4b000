use crate::action::ActionDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::SwitchboardResult;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub detail: String,
}

impl ExecutionOutcome {
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Side-effecting backend for actions the gate lets through.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &ActionDescriptor,
        payload: &serde_json::Value,
    ) -> SwitchboardResult<ExecutionOutcome>;
}

/// Logs the action and reports success without doing anything.
pub struct DryRunExecutor;

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(
        &self,
        action: &ActionDescriptor,
        _payload: &serde_json::Value,
    ) -> SwitchboardResult<ExecutionOutcome> {
        info!(
            action_id = %action.id,
            kind = %action.kind,
            confidence = action.confidence,
            "Dry run: action not executed"
        );
        Ok(ExecutionOutcome::ok(format!("dry run: {}", action.description)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::{ActionKind, RiskLevel};

    #[tokio::test]
    async fn test_dry_run_succeeds() {
        let a = ActionDescriptor::new(ActionKind::GenerateReport, RiskLevel::Low, 0.9);
        let outcome = DryRunExecutor.execute(&a, &serde_json::Value::Null).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.detail.contains("Generate report"));
    }
}
