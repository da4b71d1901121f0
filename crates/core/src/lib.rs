//! # AgentLoop Core
//!
//! Domain types, traits, and error definitions for the AgentLoop runtime.
//! Nothing here talks to the network; it defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators of the loop, the completion provider and
//! the tools, are traits here. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentConfig, RetryPolicy, RunFailure, RunOutcome, RunResult, RunStats};
pub use error::{Error, ProviderError, RegistryError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Role, ToolCallRequest, Transcript, Turn};
pub use provider::{CompletionOutcome, Provider, ProviderResponse, ToolSchema, Usage};
pub use tool::{Tool, ToolContext, ToolRegistry, ToolResult};

/// Re-exported so tools and callers share one cancellation type.
pub use tokio_util::sync::CancellationToken;
