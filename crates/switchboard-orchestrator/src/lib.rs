//! Task lifecycle, fallback routing and the engine facade for Switchboard.
//!
//! Ties the routing crate (registry, classifier, scorer) and the actions
//! crate (detector, gate) into one explicitly initialized [`Engine`].
//!
//! # Main types
//!
//! - [`Engine`]: Public surface: submit, respond, execute, classify, gate, route.
//! - [`LifecycleManager`]: Task state machine with load accounting.
//! - [`AutoAcceptSweeper`]: Cancellable background auto-accept sweep.
//! - [`FallbackBridge`]: Ordered retry across alternate workers.
//! - [`Persister`]: Best-effort background writer over a [`TaskStore`](switchboard_core::TaskStore).
//! - [`EngineConfig`]: TOML configuration with defaults for every tunable.

/// TOML engine configuration.
pub mod config;
/// Engine facade.
pub mod engine;
/// Fallback bridge.
pub mod fallback;
/// Task state machine.
pub mod lifecycle;
/// Background task writer.
pub mod persister;
/// Task store backends.
pub mod store;
/// Auto-accept sweeper.
pub mod sweep;

pub use config::{
    EngineConfig, FallbackConfig, LifecycleConfig, PersistenceConfig, RegistryConfig, StoreBackend, WorkerConfig,
};
pub use engine::{
    Decision, Engine, EngineBuilder, ProcessOutcome, ProcessRequest, TaskExecution, TaskSubmission,
};
pub use fallback::{AttemptRecord, BridgeResponse, FallbackBridge, ALL_UNAVAILABLE_MESSAGE};
pub use lifecycle::{LifecycleManager, AUTO_ACCEPT_FEEDBACK};
pub use persister::{PersistStats, Persister};
pub use store::{open_store, FileTaskStore, MemoryTaskStore, SqliteTaskStore};
pub use sweep::AutoAcceptSweeper;
