use crate::action::{ActionDescriptor, RiskLevel};
use serde::{Deserialize, Serialize};

/// Gate and executor tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Confidence must be strictly greater than this to execute.
    #[serde(default = "default_execute_threshold")]
    pub execute_threshold: f64,
    #[serde(default = "default_executor_timeout_ms")]
    pub executor_timeout_ms: u64,
}

fn default_execute_threshold() -> f64 {
    0.8
}

fn default_executor_timeout_ms() -> u64 {
    10_000
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            execute_threshold: default_execute_threshold(),
            executor_timeout_ms: default_executor_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Execute,
    Suggest,
}

/// Decides whether an action may run without a human.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    execute_threshold: f64,
}

impl ConfidenceGate {
    pub fn new(execute_threshold: f64) -> Self {
        Self { execute_threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.execute_threshold
    }

    pub fn decide(&self, action: &ActionDescriptor) -> GateDecision {
        if action.confidence > self.execute_threshold
            && action.risk_level == RiskLevel::Low
            && !action.requires_confirmation
        {
            GateDecision::Execute
        } else {
            GateDecision::Suggest
        }
    }

    /// Why `action` was not executed, or `None` if it would be.
    pub fn explain(&self, action: &ActionDescriptor) -> Option<String> {
        if action.requires_confirmation {
            Some("requires confirmation".into())
        } else if action.risk_level != RiskLevel::Low {
            Some(format!("{} risk", action.risk_level))
        } else if action.confidence <= self.execute_threshold {
            Some(format!(
                "confidence {:.2} not above {:.2}",
                action.confidence, self.execute_threshold
            ))
        } else {
            None
        }
    }
}

impl Default for ConfidenceGate {
    fn default() -> Self {
        Self::new(default_execute_threshold())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::action::ActionKind;

    #[test]
    fn test_low_risk_above_threshold_executes() {
        let gate = ConfidenceGate::default();
        let a = ActionDescriptor::new(ActionKind::CreateTask, RiskLevel::Low, 0.81);
        assert_eq!(gate.decide(&a), GateDecision::Execute);
        assert!(gate.explain(&a).is_none());
    }

    #[test]
    fn test_high_risk_never_executes() {
        let gate = ConfidenceGate::default();
        let a = ActionDescriptor::new(ActionKind::SendEmail, RiskLevel::High, 0.95);
        assert_eq!(gate.decide(&a), GateDecision::Suggest);
        assert_eq!(gate.explain(&a).unwrap(), "high risk");
    }

    #[test]
    fn test_threshold_is_strict() {
        let gate = ConfidenceGate::default();
        let a = ActionDescriptor::new(ActionKind::CreateTask, RiskLevel::Low, 0.8);
        assert_eq!(gate.decide(&a), GateDecision::Suggest);
    }

    #[test]
    fn test_confirmation_blocks_execution() {
        let gate = ConfidenceGate::default();
        let a = ActionDescriptor::new(ActionKind::CreateTask, RiskLevel::Low, 0.99).with_confirmation(true);
        assert_eq!(gate.decide(&a), GateDecision::Suggest);
        let destructive = ActionDescriptor::new(ActionKind::ProcessPayment, RiskLevel::Low, 0.99);
        assert_eq!(gate.decide(&destructive), GateDecision::Suggest);
    }
}
