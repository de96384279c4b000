use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Closed set of actions the engine knows how to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    ScheduleMeeting,
    CreateTask,
    UpdateRecord,
    DeleteRecord,
    SendNotification,
    GenerateReport,
    ProcessPayment,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::SendEmail,
        ActionKind::ScheduleMeeting,
        ActionKind::CreateTask,
        ActionKind::UpdateRecord,
        ActionKind::DeleteRecord,
        ActionKind::SendNotification,
        ActionKind::GenerateReport,
        ActionKind::ProcessPayment,
    ];

    /// Destructive kinds always require confirmation, whatever a template says.
    pub fn is_destructive(self) -> bool {
        matches!(self, ActionKind::DeleteRecord | ActionKind::ProcessPayment)
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::SendEmail => "Send email",
            ActionKind::ScheduleMeeting => "Schedule meeting",
            ActionKind::CreateTask => "Create task",
            ActionKind::UpdateRecord => "Update record",
            ActionKind::DeleteRecord => "Delete record",
            ActionKind::SendNotification => "Send notification",
            ActionKind::GenerateReport => "Generate report",
            ActionKind::ProcessPayment => "Process payment",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::SendEmail => "send_email",
            ActionKind::ScheduleMeeting => "schedule_meeting",
            ActionKind::CreateTask => "create_task",
            ActionKind::UpdateRecord => "update_record",
            ActionKind::DeleteRecord => "delete_record",
            ActionKind::SendNotification => "send_notification",
            ActionKind::GenerateReport => "generate_report",
            ActionKind::ProcessPayment => "process_payment",
        };
        f.write_str(s)
    }
}

/// How reversible an action is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn parse_level(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "high" => RiskLevel::High,
            _ => RiskLevel::Medium,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        })
    }
}

/// One action found in generated text. Lives for a single request cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub description: String,
    pub risk_level: RiskLevel,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub requires_confirmation: bool,
    pub estimated_time: String,
    /// Text following the cue phrase, if any.
    #[serde(default)]
    pub subject: Option<String>,
    /// Provider-specific extras only.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ActionDescriptor {
    pub fn new(kind: ActionKind, risk_level: RiskLevel, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            description: kind.label().to_string(),
            risk_level,
            confidence: confidence.clamp(0.0, 1.0),
            requires_confirmation: kind.is_destructive(),
            estimated_time: String::new(),
            subject: None,
            params: serde_json::Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Destructive kinds ignore `false`.
    pub fn with_confirmation(mut self, requires_confirmation: bool) -> Self {
        self.requires_confirmation = requires_confirmation || self.kind.is_destructive();
        self
    }

    pub fn with_estimated_time(mut self, estimated_time: impl Into<String>) -> Self {
        self.estimated_time = estimated_time.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_kinds_force_confirmation() {
        let delete = ActionDescriptor::new(ActionKind::DeleteRecord, RiskLevel::Low, 0.99)
            .with_confirmation(false);
        assert!(delete.requires_confirmation);

        let task = ActionDescriptor::new(ActionKind::CreateTask, RiskLevel::Low, 0.99);
        assert!(!task.requires_confirmation);
        let destructive: Vec<_> = ActionKind::ALL.iter().filter(|k| k.is_destructive()).collect();
        assert_eq!(destructive.len(), 2);
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(ActionDescriptor::new(ActionKind::SendEmail, RiskLevel::Low, 1.7).confidence, 1.0);
        assert_eq!(ActionDescriptor::new(ActionKind::SendEmail, RiskLevel::Low, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_serde_names() {
        let a = ActionDescriptor::new(ActionKind::ScheduleMeeting, RiskLevel::Medium, 0.5);
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["type"], "schedule_meeting");
        assert_eq!(json["risk_level"], "medium");
        assert_eq!(RiskLevel::parse_level("HIGH"), RiskLevel::High);
        assert_eq!(RiskLevel::parse_level("unknown"), RiskLevel::Medium);
        assert_eq!(ActionKind::ProcessPayment.to_string(), "process_payment");
    }
}
