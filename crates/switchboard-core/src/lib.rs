//! Core types and error definitions for the Switchboard routing engine.
//!
//! This crate provides the foundational types shared across all Switchboard
//! crates: the error taxonomy, the collaboration task record and its state
//! table, the weighted term matcher, and the traits for the external
//! collaborators (completion services, worker handlers, datastores).
//!
//! # Main types
//!
//! - [`SwitchboardError`]: Unified error enum for every engine component.
//! - [`SwitchboardResult`]: Convenience alias for `Result<T, SwitchboardError>`.
//! - [`CollaborationTask`]: A delegated request between two workers.
//! - [`TaskStatus`]: Lifecycle status with the legal transition table.
//! - [`TermMatcher`]: Keyword/phrase scoring used by classification and action detection.
//! - [`WorkerHandler`] / [`CompletionService`]: Seams to the services workers run on.
//! - [`TaskStore`]: Best-effort persistence seam.

/// Error taxonomy.
pub mod error;
/// Weighted keyword and phrase matching.
pub mod matching;
/// Datastore trait and query filter.
pub mod store;
/// Collaboration task record, priorities and status table.
pub mod task;
/// Completion and worker handler traits.
pub mod worker;

pub use error::{SwitchboardError, SwitchboardResult};
pub use matching::{MatchWeights, NormalizedText, TermMatch, TermMatcher};
pub use store::{TaskQuery, TaskStore};
pub use task::{CollaborationTask, CollaborationType, Priority, TaskStatus, WorkerId};
pub use worker::{
    Completion, CompletionService, PriorFailure, WorkerHandler, WorkerRequest, WorkerResponse,
};
