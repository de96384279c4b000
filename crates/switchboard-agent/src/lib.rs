//! Completion-service adapters for Switchboard workers.
//!
//! [`HttpCompletionService`] talks to any OpenAI-compatible endpoint;
//! [`CompletionHandler`] maps worker ids onto completion services and is the
//! [`WorkerHandler`](switchboard_core::WorkerHandler) the engine dispatches to.

/// Backend connection settings.
pub mod config;
/// Worker id to completion service mapping.
pub mod handler;
/// OpenAI-compatible HTTP client.
pub mod http;

pub use config::HttpBackendConfig;
pub use handler::{render_prompt, CompletionHandler, EchoCompletionService};
pub use http::{parse_chat_response, HttpCompletionService};
