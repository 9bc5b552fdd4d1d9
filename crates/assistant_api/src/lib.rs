//! Transport primitives for the hosted assistant service.
//!
//! This crate owns request building, response parsing, and client construction
//! for the threads/messages/runs surface. It holds no conversation state; the
//! session layer drives these calls through the [`AssistantService`] contract.
//!
//! Client construction is environment-aware: see [`environment`] for how a
//! hosted sandbox is detected and [`builder`] for the strategy fallback chain.
//! [`retry`] provides the backoff combinator used around every network step.

pub mod builder;
pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod service;
pub mod url;

pub use builder::{ClientBuilder, ConstructionStrategy};
pub use client::AssistantClient;
pub use config::AssistantApiConfig;
pub use environment::{detect_environment, Environment, EnvironmentReport};
pub use error::AssistantApiError;
pub use payload::{MessageRole, Model, Run, RunStatus, Thread, ThreadMessage};
pub use retry::{with_retry, with_retry_if, RetryError, RetryPolicy};
pub use service::AssistantService;
pub use url::normalize_base_url;
