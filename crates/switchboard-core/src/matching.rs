//! Weighted keyword/phrase matching shared by request classification and
//! action detection.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Weights applied to each kind of match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatchWeights {
    #[serde(default = "default_keyword_weight")]
    pub keyword: f64,
    #[serde(default = "default_phrase_weight")]
    pub phrase: f64,
}

fn default_keyword_weight() -> f64 {
    1.0
}

fn default_phrase_weight() -> f64 {
    2.0
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            keyword: default_keyword_weight(),
            phrase: default_phrase_weight(),
        }
    }
}

/// Lowercased, whitespace-normalized text with a token set for whole-word lookups.
#[derive(Debug, Clone)]
pub struct NormalizedText {
    text: String,
    tokens: HashSet<String>,
}

impl NormalizedText {
    pub fn new(raw: &str) -> Self {
        let lowered = raw.to_lowercase();
        let tokens = lowered
            .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        let text = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
        Self { text, tokens }
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.tokens.contains(&token.to_lowercase())
    }

    pub fn has_phrase(&self, phrase: &str) -> bool {
        self.find_phrase(phrase).is_some()
    }

    /// Byte offset (into [`as_str`](Self::as_str)) of the first occurrence of `phrase`.
    pub fn find_phrase(&self, phrase: &str) -> Option<usize> {
        let needle = normalize_phrase(phrase);
        if needle.is_empty() {
            return None;
        }
        self.text.find(&needle)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

fn normalize_phrase(phrase: &str) -> String {
    phrase
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result of matching one term list against a text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermMatch {
    /// Sum of weights of every matched keyword and phrase.
    pub matched_weight: f64,
    pub matched_keywords: Vec<String>,
    pub matched_phrases: Vec<String>,
    /// Number of keyword + phrase patterns, the score denominator.
    pub pattern_count: usize,
}

impl TermMatch {
    /// `matched_weight / max(1, pattern_count)`, before any base confidence.
    pub fn raw_score(&self) -> f64 {
        self.matched_weight / self.pattern_count.max(1) as f64
    }

    pub fn is_empty(&self) -> bool {
        self.matched_keywords.is_empty() && self.matched_phrases.is_empty()
    }
}

/// A keyword + phrase term list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermMatcher {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub phrases: Vec<String>,
}

impl TermMatcher {
    pub fn new(keywords: &[&str], phrases: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            phrases: phrases.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.keywords.len() + self.phrases.len()
    }

    pub fn evaluate(&self, text: &NormalizedText, weights: MatchWeights) -> TermMatch {
        let matched_keywords: Vec<String> = self
            .keywords
            .iter()
            .filter(|k| text.has_token(k))
            .cloned()
            .collect();
        let matched_phrases: Vec<String> = self
            .phrases
            .iter()
            .filter(|p| text.has_phrase(p))
            .cloned()
            .collect();

        let matched_weight = matched_keywords.len() as f64 * weights.keyword
            + matched_phrases.len() as f64 * weights.phrase;

        TermMatch {
            matched_weight,
            matched_keywords,
            matched_phrases,
            pattern_count: self.pattern_count(),
        }
    }
}
