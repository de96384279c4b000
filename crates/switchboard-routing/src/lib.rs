//! Worker registry, request classification and selection scoring.
//!
//! # Main types
//!
//! - [`CapabilityRegistry`]: Shared table of worker profiles with atomic load accounting.
//! - [`RequestClassifier`]: Maps a message and its attachments to a request type.
//! - [`SelectionScorer`]: Ranks eligible workers into a [`RoutingDecision`].

/// Request type classification.
pub mod classifier;
/// Worker capability profiles and load accounting.
pub mod registry;
/// Selection scoring.
pub mod scorer;

pub use classifier::{default_patterns, Classification, ClassifierConfig, RequestClassifier, RequestPattern};
pub use registry::{Availability, CapabilityProfile, CapabilityRegistry, DEFAULT_EMA_WEIGHT};
pub use scorer::{CandidateScore, RoutingDecision, ScoreBreakdown, ScoringWeights, SelectionScorer};
