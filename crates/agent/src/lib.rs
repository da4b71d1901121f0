//! The bounded tool-calling loop at the heart of AgentLoop.
//!
//! A run follows an explicit state machine:
//!
//! 1. **Init**: seed the transcript with the system prompt and user message
//! 2. **Awaiting model**: send transcript + tool schemas to the provider
//! 3. **Awaiting tools**: run the requested tools, append one result per call
//! 4. Loop back to step 2 until the model answers, the iteration cap is hit,
//!    the provider fails for good, or the caller cancels
//!
//! Every exit path produces a [`RunResult`](agentloop_core::RunResult); no
//! error escapes `run`.

pub mod loop_runner;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentLoop, UNKNOWN_TOOL};
