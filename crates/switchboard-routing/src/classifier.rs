//! Request classification.
//!
//! Maps a free-text message (plus the MIME types or file extensions of any
//! attachments) to a request type and the capabilities a worker needs to
//! handle it. Scoring is keyword/phrase based: see [`TermMatcher`].

use serde::{Deserialize, Serialize};
use switchboard_core::{MatchWeights, NormalizedText, TermMatcher};
use tracing::debug;

/// One row of the classification table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPattern {
    pub request_type: String,
    #[serde(flatten)]
    pub terms: TermMatcher,
    /// MIME types (`application/pdf`), MIME prefixes (`image/`) or file
    /// extensions (`.csv`).
    #[serde(default)]
    pub attachment_types: Vec<String>,
    pub base_confidence: f64,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl RequestPattern {
    pub fn new(request_type: impl Into<String>, base_confidence: f64) -> Self {
        Self {
            request_type: request_type.into(),
            terms: TermMatcher::default(),
            attachment_types: Vec::new(),
            base_confidence,
            required_capabilities: Vec::new(),
        }
    }

    pub fn with_terms(mut self, keywords: &[&str], phrases: &[&str]) -> Self {
        self.terms = TermMatcher::new(keywords, phrases);
        self
    }

    pub fn with_attachments(mut self, types: &[&str]) -> Self {
        self.attachment_types = types.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_capabilities(mut self, caps: &[&str]) -> Self {
        self.required_capabilities = caps.iter().map(|s| s.to_string()).collect();
        self
    }

    fn attachment_hits(&self, attachments: &[String]) -> usize {
        self.attachment_types
            .iter()
            .filter(|pred| attachments.iter().any(|a| attachment_matches(pred, a)))
            .count()
    }
}

fn attachment_matches(predicate: &str, actual: &str) -> bool {
    let predicate = predicate.trim().to_lowercase();
    let actual = actual.trim().to_lowercase();
    if predicate.is_empty() {
        return false;
    }
    if let Some(prefix) = predicate.strip_suffix('*') {
        return actual.starts_with(prefix);
    }
    if predicate.ends_with('/') {
        return actual.starts_with(&predicate);
    }
    if predicate.starts_with('.') {
        return actual.ends_with(&predicate);
    }
    actual == predicate
}

/// Classifier tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Best scores below this fall back to the generic type.
    #[serde(default = "default_floor")]
    pub floor: f64,
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
    #[serde(default = "default_fallback_type")]
    pub fallback_type: String,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    #[serde(default = "default_phrase_weight")]
    pub phrase_weight: f64,
    #[serde(default = "default_attachment_weight")]
    pub attachment_weight: f64,
    /// Replaces the built-in table when set.
    #[serde(default)]
    pub patterns: Option<Vec<RequestPattern>>,
}

fn default_floor() -> f64 {
    0.3
}
fn default_fallback_confidence() -> f64 {
    0.5
}
fn default_fallback_type() -> String {
    "general_inquiry".into()
}
fn default_keyword_weight() -> f64 {
    1.0
}
fn default_phrase_weight() -> f64 {
    2.0
}
fn default_attachment_weight() -> f64 {
    1.5
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
            fallback_confidence: default_fallback_confidence(),
            fallback_type: default_fallback_type(),
            keyword_weight: default_keyword_weight(),
            phrase_weight: default_phrase_weight(),
            attachment_weight: default_attachment_weight(),
            patterns: None,
        }
    }
}

/// Built-in classification table.
pub fn default_patterns() -> Vec<RequestPattern> {
    vec![
        RequestPattern::new("technical_support", 0.9)
            .with_terms(
                &["error", "bug", "crash", "login", "password"],
                &["not working", "error message", "reset my password"],
            )
            .with_attachments(&["image/", ".log"])
            .with_capabilities(&["technical_support"]),
        RequestPattern::new("billing_inquiry", 0.9)
            .with_terms(
                &["invoice", "refund", "charge", "billing", "payment"],
                &["charged twice", "cancel my subscription", "update my card"],
            )
            .with_attachments(&["application/pdf"])
            .with_capabilities(&["billing"]),
        RequestPattern::new("scheduling", 0.85)
            .with_terms(
                &["meeting", "schedule", "calendar", "appointment", "reschedule"],
                &["set up a meeting", "book a call", "find a time"],
            )
            .with_attachments(&["text/calendar", ".ics"])
            .with_capabilities(&["scheduling"]),
        RequestPattern::new("data_analysis", 0.85)
            .with_terms(
                &["analyze", "analysis", "metrics", "trend", "forecast"],
                &["sales data", "quarterly numbers", "break down"],
            )
            .with_attachments(&[".csv", ".xlsx"])
            .with_capabilities(&["data_analysis"]),
        RequestPattern::new("document_review", 0.8)
            .with_terms(
                &["review", "contract", "document", "proofread", "clause"],
                &["take a look at", "review this document", "summarize the attached"],
            )
            .with_attachments(&["application/pdf", ".docx"])
            .with_capabilities(&["document_review"]),
        RequestPattern::new("content_creation", 0.8)
            .with_terms(
                &["blog", "article", "newsletter", "caption", "tagline"],
                &["write a", "social media post", "product description"],
            )
            .with_capabilities(&["content_writing"]),
    ]
}

/// Result of [`RequestClassifier::classify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub request_type: String,
    pub required_capabilities: Vec<String>,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Unclamped best pattern score; 0 when nothing matched.
    pub score: f64,
    #[serde(default)]
    pub matched_terms: Vec<String>,
}

/// Picks the highest scoring pattern for a request.
pub struct RequestClassifier {
    patterns: Vec<RequestPattern>,
    config: ClassifierConfig,
}

impl RequestClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let patterns = config.patterns.clone().unwrap_or_else(default_patterns);
        Self { patterns, config }
    }

    pub fn patterns(&self) -> &[RequestPattern] {
        &self.patterns
    }

    pub fn classify(&self, message: &str, attachment_types: &[String]) -> Classification {
        let text = NormalizedText::new(message);
        let weights = MatchWeights {
            keyword: self.config.keyword_weight,
            phrase: self.config.phrase_weight,
        };

        let mut best: Option<(&RequestPattern, f64, Vec<String>)> = None;
        for pattern in &self.patterns {
            let m = pattern.terms.evaluate(&text, weights);
            let attachment_hits = pattern.attachment_hits(attachment_types);
            let weight = m.matched_weight + attachment_hits as f64 * self.config.attachment_weight;
            let score = weight / m.pattern_count.max(1) as f64 * pattern.base_confidence;

            // Strict comparison keeps the earlier pattern on ties.
            if best.as_ref().map_or(true, |(_, s, _)| score > *s) {
                let mut matched = m.matched_keywords;
                matched.extend(m.matched_phrases);
                best = Some((pattern, score, matched));
            }
        }

        match best {
            Some((pattern, score, matched_terms)) if score >= self.config.floor => {
                debug!(
                    request_type = %pattern.request_type,
                    score,
                    "Request classified"
                );
                Classification {
                    request_type: pattern.request_type.clone(),
                    required_capabilities: pattern.required_capabilities.clone(),
                    confidence: score.clamp(0.0, 1.0),
                    score,
                    matched_terms,
                }
            }
            other => {
                let score = other.map_or(0.0, |(_, s, _)| s);
                debug!(score, floor = self.config.floor, "Request below floor, falling back");
                Classification {
                    request_type: self.config.fallback_type.clone(),
                    required_capabilities: Vec::new(),
                    confidence: self.config.fallback_confidence,
                    score,
                    matched_terms: Vec::new(),
                }
            }
        }
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_matches_fall_back_to_general_inquiry() {
        let c = RequestClassifier::default();
        let result = c.classify("hello there, how are you today", &[]);
        assert_eq!(result.request_type, "general_inquiry");
        assert!((result.confidence - 0.5).abs() < 1e-9);
        assert!(result.required_capabilities.is_empty());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_billing_message() {
        let c = RequestClassifier::default();
        // refund + invoice (2) + "charged twice" (2) = 4 over 8 patterns, × 0.9
        let result = c.classify("I was charged twice and need a refund for my invoice", &[]);
        assert_eq!(result.request_type, "billing_inquiry");
        assert!((result.confidence - 0.45).abs() < 1e-9);
        assert_eq!(result.required_capabilities, vec!["billing".to_string()]);
        assert!(result.matched_terms.contains(&"charged twice".to_string()));
    }

    #[test]
    fn test_attachment_predicate_adds_weight() {
        let c = RequestClassifier::default();
        let result = c.classify(
            "I was charged twice and need a refund for my invoice",
            &["application/pdf".to_string()],
        );
        assert_eq!(result.request_type, "billing_inquiry");
        assert!((result.confidence - 5.5 / 8.0 * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_below_floor_falls_back() {
        let c = RequestClassifier::default();
        // payment alone: 1/8 × 0.9 = 0.1125
        let result = c.classify("what about the payment", &[]);
        assert_eq!(result.request_type, "general_inquiry");
        assert!((result.score - 0.1125).abs() < 1e-9);
    }

    #[test]
    fn test_ties_go_to_earlier_pattern() {
        let config = ClassifierConfig {
            patterns: Some(vec![
                RequestPattern::new("first", 1.0).with_terms(&["alpha"], &[]),
                RequestPattern::new("second", 1.0).with_terms(&["alpha"], &[]),
            ]),
            ..Default::default()
        };
        let c = RequestClassifier::new(config);
        assert_eq!(c.classify("alpha", &[]).request_type, "first");
    }

    #[test]
    fn test_confidence_is_clamped() {
        let config = ClassifierConfig {
            patterns: Some(vec![RequestPattern::new("loud", 1.0)
                .with_terms(&[], &["big phrase"])
                .with_attachments(&["image/"])]),
            ..Default::default()
        };
        let c = RequestClassifier::new(config);
        let result = c.classify("a BIG   phrase", &["image/png".to_string()]);
        assert_eq!(result.request_type, "loud");
        assert!((result.score - 3.5).abs() < 1e-9);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_attachment_matching_forms() {
        assert!(attachment_matches("image/", "image/png"));
        assert!(attachment_matches("image/*", "IMAGE/jpeg"));
        assert!(attachment_matches(".csv", "q3-report.CSV"));
        assert!(attachment_matches("application/pdf", "application/pdf"));
        assert!(!attachment_matches("application/pdf", "application/pdfx"));
        assert!(!attachment_matches("", "anything"));
    }

    #[test]
    fn test_pattern_table_deserializes_flat_terms() {
        let value = serde_json::json!({
            "floor": 0.2,
            "patterns": [{
                "request_type": "legal",
                "keywords": ["contract"],
                "phrases": ["terms of service"],
                "base_confidence": 0.7,
                "required_capabilities": ["legal"]
            }]
        });
        let config: ClassifierConfig = serde_json::from_value(value).unwrap();
        assert!((config.phrase_weight - 2.0).abs() < 1e-9);
        let c = RequestClassifier::new(config);
        assert_eq!(c.patterns().len(), 1);
        let result = c.classify("please check this contract", &[]);
        assert_eq!(result.request_type, "legal");
        assert!((result.confidence - 0.35).abs() < 1e-9);
    }
}
