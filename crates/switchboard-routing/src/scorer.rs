use crate::registry::CapabilityProfile;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use switchboard_core::{Priority, WorkerId};
use tracing::debug;

/// Weights for the selection score. A worker's total is
/// `success_rate + headroom + responsiveness + capability match + priority`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_load_headroom_weight")]
    pub load_headroom_weight: f64,
    #[serde(default = "default_responsiveness_ceiling")]
    pub responsiveness_ceiling: f64,
    /// One point of responsiveness is lost per this many milliseconds.
    #[serde(default = "default_responsiveness_unit_ms")]
    pub responsiveness_unit_ms: f64,
    #[serde(default = "default_capability_match_bonus")]
    pub capability_match_bonus: f64,
    #[serde(default = "default_urgent_bonus")]
    pub urgent_bonus: f64,
    #[serde(default = "default_high_bonus")]
    pub high_bonus: f64,
}

fn default_load_headroom_weight() -> f64 {
    50.0
}
fn default_responsiveness_ceiling() -> f64 {
    10.0
}
fn default_responsiveness_unit_ms() -> f64 {
    1000.0
}
fn default_capability_match_bonus() -> f64 {
    10.0
}
fn default_urgent_bonus() -> f64 {
    20.0
}
fn default_high_bonus() -> f64 {
    10.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            load_headroom_weight: default_load_headroom_weight(),
            responsiveness_ceiling: default_responsiveness_ceiling(),
            responsiveness_unit_ms: default_responsiveness_unit_ms(),
            capability_match_bonus: default_capability_match_bonus(),
            urgent_bonus: default_urgent_bonus(),
            high_bonus: default_high_bonus(),
        }
    }
}

impl ScoringWeights {
    pub fn priority_bonus(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Urgent => self.urgent_bonus,
            Priority::High => self.high_bonus,
            Priority::Medium | Priority::Low => 0.0,
        }
    }
}

/// Per-factor contribution to a candidate's total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub success_rate: f64,
    pub load_headroom: f64,
    pub responsiveness: f64,
    pub capability_match: f64,
    pub priority: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.success_rate + self.load_headroom + self.responsiveness + self.capability_match + self.priority
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub worker_id: WorkerId,
    pub total: f64,
    pub breakdown: ScoreBreakdown,
}

/// Outcome of ranking the eligible workers for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// `None` when no worker was eligible.
    pub selected: Option<WorkerId>,
    pub confidence: f64,
    /// Best first.
    pub candidates: Vec<CandidateScore>,
    pub reasoning: String,
}

impl RoutingDecision {
    /// Ranked runners-up, usable as a fallback chain.
    pub fn alternatives(&self) -> Vec<WorkerId> {
        self.candidates
            .iter()
            .skip(1)
            .map(|c| c.worker_id.clone())
            .collect()
    }
}

/// Ranks eligible workers. Pure; never touches the registry.
#[derive(Debug, Clone, Default)]
pub struct SelectionScorer {
    weights: ScoringWeights,
}

impl SelectionScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn score(&self, profile: &CapabilityProfile, required: &[String], priority: Priority) -> CandidateScore {
        let w = &self.weights;
        let headroom = if profile.max_concurrent == 0 {
            0.0
        } else {
            (1.0 - f64::from(profile.current_load) / f64::from(profile.max_concurrent)).max(0.0)
        };
        let responsiveness = if w.responsiveness_unit_ms > 0.0 {
            (w.responsiveness_ceiling - profile.avg_response_time_ms / w.responsiveness_unit_ms).max(0.0)
        } else {
            0.0
        };
        let breakdown = ScoreBreakdown {
            success_rate: profile.success_rate,
            load_headroom: headroom * w.load_headroom_weight,
            responsiveness,
            capability_match: profile.matched_count(required) as f64 * w.capability_match_bonus,
            priority: w.priority_bonus(priority),
        };
        CandidateScore {
            worker_id: profile.worker_id.clone(),
            total: breakdown.total(),
            breakdown,
        }
    }

    /// Highest total any worker could reach for this request.
    pub fn max_attainable(&self, required: &[String], priority: Priority) -> f64 {
        let w = &self.weights;
        100.0
            + w.load_headroom_weight
            + w.responsiveness_ceiling
            + required.len() as f64 * w.capability_match_bonus
            + w.priority_bonus(priority)
    }

    /// Score and sort `eligible`, best first. Equal totals keep input order.
    pub fn rank(&self, eligible: &[CapabilityProfile], required: &[String], priority: Priority) -> RoutingDecision {
        let mut candidates: Vec<CandidateScore> = eligible
            .iter()
            .map(|p| self.score(p, required, priority))
            .collect();
        // Vec::sort_by is stable.
        candidates.sort_by(|a, b| b.total.partial_cmp(&a.total).unwrap_or(Ordering::Equal));

        let Some(best) = candidates.first() else {
            return RoutingDecision {
                selected: None,
                confidence: 0.0,
                candidates,
                reasoning: format!("No eligible worker for capabilities [{}]", required.join(", ")),
            };
        };

        let max = self.max_attainable(required, priority);
        let confidence = if max > 0.0 {
            (best.total / max).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let b = &best.breakdown;
        let reasoning = format!(
            "Selected {} with score {:.1} (success {:.1}, headroom {:.1}, responsiveness {:.1}, capability {:.1}, priority {:.1}) out of {} eligible worker(s)",
            best.worker_id,
            best.total,
            b.success_rate,
            b.load_headroom,
            b.responsiveness,
            b.capability_match,
            b.priority,
            candidates.len()
        );
        debug!(
            worker = %best.worker_id,
            score = best.total,
            confidence,
            candidates = candidates.len(),
            "Routing decision"
        );

        RoutingDecision {
            selected: Some(best.worker_id.clone()),
            confidence,
            candidates,
            reasoning,
        }
    }
}
