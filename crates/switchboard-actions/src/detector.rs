//! Detects actionable intents in generated text.
//!
//! Text is split into sentences and each sentence is scored against every
//! [`ActionTemplate`]. A template's phrases are its cues: a sentence must
//! contain at least one of them before the template fires. Keywords only
//! raise the confidence.

use crate::action::{ActionDescriptor, ActionKind, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use switchboard_core::{MatchWeights, NormalizedText, TermMatcher};
use tracing::debug;

/// Pattern describing one kind of action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub kind: ActionKind,
    /// `phrases` are the cue phrases.
    #[serde(flatten)]
    pub terms: TermMatcher,
    pub base_confidence: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_confirmation: bool,
    #[serde(default)]
    pub estimated_time: String,
}

impl ActionTemplate {
    pub fn new(kind: ActionKind, risk_level: RiskLevel, base_confidence: f64) -> Self {
        Self {
            kind,
            terms: TermMatcher::default(),
            base_confidence,
            risk_level,
            requires_confirmation: kind.is_destructive(),
            estimated_time: String::new(),
        }
    }

    pub fn with_cues(mut self, cues: &[&str], keywords: &[&str]) -> Self {
        self.terms = TermMatcher::new(keywords, cues);
        self
    }

    pub fn with_confirmation(mut self, requires_confirmation: bool) -> Self {
        self.requires_confirmation = requires_confirmation;
        self
    }

    pub fn with_estimated_time(mut self, estimated_time: impl Into<String>) -> Self {
        self.estimated_time = estimated_time.into();
        self
    }
}

/// Built-in templates, one per [`ActionKind`].
pub fn default_templates() -> Vec<ActionTemplate> {
    vec![
        ActionTemplate::new(ActionKind::SendEmail, RiskLevel::Medium, 0.9)
            .with_cues(&["send an email", "i'll email"], &["email", "reply"])
            .with_estimated_time("1 minute"),
        ActionTemplate::new(ActionKind::ScheduleMeeting, RiskLevel::Medium, 0.9)
            .with_cues(&["schedule a meeting", "set up a meeting", "book a call"], &["meeting", "calendar", "invite"])
            .with_estimated_time("2 minutes"),
        ActionTemplate::new(ActionKind::CreateTask, RiskLevel::Low, 0.95)
            .with_cues(&["create a task", "add a task"], &["task", "reminder"])
            .with_estimated_time("instant"),
        ActionTemplate::new(ActionKind::UpdateRecord, RiskLevel::Medium, 0.85)
            .with_cues(&["update the record", "update your account"], &["record", "account"])
            .with_estimated_time("1 minute"),
        ActionTemplate::new(ActionKind::DeleteRecord, RiskLevel::High, 0.9)
            .with_cues(&["delete the record", "remove your account"], &["delete", "remove"])
            .with_estimated_time("1 minute"),
        ActionTemplate::new(ActionKind::SendNotification, RiskLevel::Low, 0.9)
            .with_cues(&["notify the team", "send a notification"], &["notify", "alert"])
            .with_estimated_time("instant"),
        ActionTemplate::new(ActionKind::GenerateReport, RiskLevel::Low, 0.9)
            .with_cues(&["generate a report", "prepare a report"], &["report", "summary"])
            .with_estimated_time("5 minutes"),
        ActionTemplate::new(ActionKind::ProcessPayment, RiskLevel::High, 0.9)
            .with_cues(&["process the payment", "process a refund", "issue a refund"], &["payment", "refund"])
            .with_estimated_time("2 minutes"),
    ]
}

/// Per-request detection options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionContext {
    /// Only these kinds are reported when set.
    #[serde(default)]
    pub allowed_kinds: Option<Vec<ActionKind>>,
    /// When false every action is suggested, never executed.
    #[serde(default = "default_autonomous")]
    pub autonomous: bool,
}

fn default_autonomous() -> bool {
    true
}

impl Default for DetectionContext {
    fn default() -> Self {
        Self {
            allowed_kinds: None,
            autonomous: default_autonomous(),
        }
    }
}

impl DetectionContext {
    pub fn with_allowed_kinds(mut self, kinds: Vec<ActionKind>) -> Self {
        self.allowed_kinds = Some(kinds);
        self
    }

    pub fn suggest_only(mut self) -> Self {
        self.autonomous = false;
        self
    }

    pub fn allows(&self, kind: ActionKind) -> bool {
        self.allowed_kinds.as_ref().map_or(true, |k| k.contains(&kind))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection {
    pub has_actions: bool,
    pub actions: Vec<ActionDescriptor>,
}

pub struct ActionDetector {
    templates: Vec<ActionTemplate>,
    weights: MatchWeights,
}

impl ActionDetector {
    pub fn new(templates: Vec<ActionTemplate>) -> Self {
        Self {
            templates,
            weights: MatchWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: MatchWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn templates(&self) -> &[ActionTemplate] {
        &self.templates
    }

    pub fn detect(&self, text: &str, context: &DetectionContext) -> Detection {
        // kind -> (first position, best descriptor)
        let mut found: HashMap<ActionKind, (usize, ActionDescriptor)> = HashMap::new();

        for (sentence_idx, sentence) in split_sentences(text).into_iter().enumerate() {
            let normalized = NormalizedText::new(sentence);
            for template in &self.templates {
                if !context.allows(template.kind) {
                    continue;
                }
                let m = template.terms.evaluate(&normalized, self.weights);
                let Some(cue) = m.matched_phrases.first() else {
                    continue;
                };
                let confidence = (m.raw_score() * template.base_confidence).clamp(0.0, 1.0);
                let cue_offset = normalized.find_phrase(cue).unwrap_or(0);
                // Sentences are ordered; the offset orders kinds within one sentence.
                let position = sentence_idx * 1_000_000 + cue_offset;

                let mut descriptor = ActionDescriptor::new(template.kind, template.risk_level, confidence)
                    .with_confirmation(template.requires_confirmation)
                    .with_estimated_time(template.estimated_time.clone());
                if let Some(subject) = subject_after(&normalized, cue) {
                    descriptor = descriptor
                        .with_description(format!("{}: {}", template.kind.label(), subject))
                        .with_subject(subject);
                }

                match found.get_mut(&template.kind) {
                    Some((_, existing)) => {
                        if descriptor.confidence > existing.confidence {
                            *existing = descriptor;
                        }
                    }
                    None => {
                        found.insert(template.kind, (position, descriptor));
                    }
                }
            }
        }

        let mut ordered: Vec<(usize, ActionDescriptor)> = found.into_values().collect();
        ordered.sort_by_key(|(pos, _)| *pos);
        let actions: Vec<ActionDescriptor> = ordered.into_iter().map(|(_, a)| a).collect();
        debug!(count = actions.len(), "Action detection finished");

        Detection {
            has_actions: !actions.is_empty(),
            actions,
        }
    }
}

impl Default for ActionDetector {
    fn default() -> Self {
        Self::new(default_templates())
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?', '\n', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Words following `cue` in the sentence, without trailing punctuation.
fn subject_after(sentence: &NormalizedText, cue: &str) -> Option<String> {
    let cue = cue.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let start = sentence.find_phrase(&cue)? + cue.len();
    let rest = sentence.as_str().get(start..)?;
    let subject = rest
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
    if subject.is_empty() {
        None
    } else {
        Some(subject.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_required() {
        let d = ActionDetector::default();
        // Keywords alone never fire a template.
        let detection = d.detect("The task reminder is in the calendar.", &DetectionContext::default());
        assert!(!detection.has_actions);
    }

    #[test]
    fn test_confidence_from_term_score() {
        let d = ActionDetector::default();
        let detection = d.detect("I'll create a task with a reminder for Friday.", &DetectionContext::default());
        assert_eq!(detection.actions.len(), 1);
        let a = &detection.actions[0];
        assert_eq!(a.kind, ActionKind::CreateTask);
        // cue (2) + task + reminder = 4 over 4 patterns
        assert!((a.confidence - 0.95).abs() < 1e-9);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.subject.as_deref(), Some("with a reminder for friday"));
    }

    #[test]
    fn test_one_action_per_kind_keeps_highest_confidence() {
        let d = ActionDetector::default();
        let text = "I'll notify the team. Then I will notify the team with an alert.";
        let detection = d.detect(text, &DetectionContext::default());
        assert_eq!(detection.actions.len(), 1);
        assert!((detection.actions[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_actions_ordered_by_first_appearance() {
        let d = ActionDetector::default();
        let text = "Next I will generate a report. I can also schedule a meeting, and create a task.";
        let kinds: Vec<_> = d
            .detect(text, &DetectionContext::default())
            .actions
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ActionKind::GenerateReport, ActionKind::ScheduleMeeting, ActionKind::CreateTask]
        );
    }

    #[test]
    fn test_destructive_template_requires_confirmation() {
        let d = ActionDetector::default();
        let detection = d.detect("I will delete the record now.", &DetectionContext::default());
        let a = &detection.actions[0];
        assert_eq!(a.kind, ActionKind::DeleteRecord);
        assert!(a.requires_confirmation);
        assert_eq!(a.risk_level, RiskLevel::High);
    }

    #[test]
    fn test_allowed_kinds_filter() {
        let d = ActionDetector::default();
        let ctx = DetectionContext::default().with_allowed_kinds(vec![ActionKind::SendEmail]);
        let detection = d.detect("I'll generate a report and send an email.", &ctx);
        assert_eq!(detection.actions.len(), 1);
        assert_eq!(detection.actions[0].kind, ActionKind::SendEmail);
    }

    #[test]
    fn test_split_sentences() {
        assert_eq!(split_sentences("One. Two!\nThree?  "), vec!["One", "Two", "Three"]);
        assert!(split_sentences(" . ").is_empty());
    }
}
