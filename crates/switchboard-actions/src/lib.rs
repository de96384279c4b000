//! Action detection and autonomy gating for Switchboard.
//!
//! Generated text is scanned for actionable intents ([`ActionDetector`]).
//! Each intent is either executed through an [`ActionExecutor`] or downgraded
//! to a suggestion by the [`ConfidenceGate`]. [`ActionPipeline`] ties the three
//! together.

/// Action kinds, risk levels and descriptors.
pub mod action;
/// Template-based intent detection.
pub mod detector;
/// Executor seam.
pub mod executor;
/// Execute-or-suggest policy.
pub mod gate;
/// Detect, gate and execute.
pub mod pipeline;

pub use action::{ActionDescriptor, ActionKind, RiskLevel};
pub use detector::{default_templates, ActionDetector, ActionTemplate, Detection, DetectionContext};
pub use executor::{ActionExecutor, DryRunExecutor, ExecutionOutcome};
pub use gate::{ConfidenceGate, GateConfig, GateDecision};
pub use pipeline::{ActionPipeline, ExecutedAction, GatedActions};
