//! Completion provider adapters for AgentLoop.
//!
//! All providers implement the `agentloop_core::Provider` trait and hide
//! their wire format behind `CompletionOutcome`.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
