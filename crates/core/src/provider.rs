//! Provider trait, the abstraction over LLM backends.
//!
//! A Provider knows how to send a transcript to an LLM and translate the
//! reply into a [`CompletionOutcome`]: either a final answer or a list of
//! requested tool calls. All provider-specific response shapes stay inside
//! the implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::error::ProviderError;
use crate::message::{ToolCallRequest, Transcript};

/// A tool schema sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// The model is done and answered in text.
    FinalAnswer { text: String },

    /// The model wants tools run before it continues.
    ToolCallsRequested {
        /// Optional text the model emitted alongside the calls
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The interpreted outcome
    pub outcome: CompletionOutcome,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

impl ProviderResponse {
    /// A final-answer response with no usage information.
    pub fn final_answer(text: impl Into<String>) -> Self {
        Self {
            outcome: CompletionOutcome::FinalAnswer { text: text.into() },
            usage: None,
            model: String::new(),
        }
    }

    /// A tool-call response with no usage information.
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            outcome: CompletionOutcome::ToolCallsRequested {
                content: None,
                calls,
            },
            usage: None,
            model: String::new(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls `complete()`
/// without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai").
    fn name(&self) -> &str;

    /// Send the transcript and tool schemas, get the model's decision back.
    async fn complete(
        &self,
        transcript: &Transcript,
        tools: &[ToolSchema],
        config: &AgentConfig,
    ) -> std::result::Result<ProviderResponse, ProviderError>;
}
