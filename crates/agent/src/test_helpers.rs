//! Shared test helpers for agent loop tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use agentloop_core::CancellationToken;
use agentloop_core::agent::AgentConfig;
use agentloop_core::error::{ProviderError, ToolError};
use agentloop_core::message::{Role, ToolCallRequest, Transcript};
use agentloop_core::provider::{
    CompletionOutcome, Provider, ProviderResponse, ToolSchema, Usage,
};
use agentloop_core::tool::{Tool, ToolContext, ToolRegistry, ToolResult};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next entry in the script and records
/// the transcript it was shown. Panics if more calls are made than entries
/// provided.
pub struct SequentialMockProvider {
    script: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    seen: Mutex<Vec<Transcript>>,
    delay: Option<Duration>,
}

impl SequentialMockProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script),
            seen: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![Ok(make_text_response(text))])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(calls: Vec<ToolCallRequest>, answer: &str) -> Self {
        Self::new(vec![
            Ok(make_tool_call_response(calls)),
            Ok(make_text_response(answer)),
        ])
    }

    /// Sleep this long before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen_transcripts(&self) -> Vec<Transcript> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        transcript: &Transcript,
        _tools: &[ToolSchema],
        _config: &AgentConfig,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut seen = self.seen.lock().unwrap();
        let script = self.script.lock().unwrap();
        let call = seen.len();
        if call >= script.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{call}, have {})",
                script.len()
            );
        }
        seen.push(transcript.clone());
        script[call].clone()
    }
}

/// A stateless provider: asks `echo` to repeat the user message, then
/// answers with whatever the tool returned.
pub struct ReflexProvider;

#[async_trait::async_trait]
impl Provider for ReflexProvider {
    fn name(&self) -> &str {
        "reflex"
    }

    async fn complete(
        &self,
        transcript: &Transcript,
        _tools: &[ToolSchema],
        _config: &AgentConfig,
    ) -> Result<ProviderResponse, ProviderError> {
        let last = transcript.last().expect("non-empty transcript");
        match last.role {
            Role::Tool => {
                let message = last
                    .tool_result
                    .as_ref()
                    .map(|r| r.message.clone())
                    .unwrap_or_default();
                Ok(make_text_response(&format!("echoed: {message}")))
            }
            _ => Ok(make_tool_call_response(vec![make_call(
                "call_echo",
                "echo",
                serde_json::json!({ "text": last.text() }),
            )])),
        }
    }
}

fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse::final_answer(text)
        .with_usage(usage())
        .with_model("mock-model")
}

/// Create a response requesting the given tool calls.
pub fn make_tool_call_response(calls: Vec<ToolCallRequest>) -> ProviderResponse {
    ProviderResponse {
        outcome: CompletionOutcome::ToolCallsRequested {
            content: None,
            calls,
        },
        usage: Some(usage()),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call.
pub fn make_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments)
}

pub fn registry_with_echo() -> ToolRegistry {
    ToolRegistry::new().with(Arc::new(EchoTool)).unwrap()
}

/// Returns its `text` argument.
pub struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the input text"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let text = arguments["text"].as_str().unwrap_or_default().to_string();
        Ok(ToolResult::ok_with_data(
            text.clone(),
            serde_json::json!({ "text": text }),
        ))
    }
}

/// Always returns an execution error.
pub struct FailingTool;

#[async_trait::async_trait]
impl Tool for FailingTool {
    fn name(&self) -> &str {
        "failing"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "failing".into(),
            reason: "backend unavailable".into(),
        })
    }
}

/// Always panics.
pub struct PanickingTool;

#[async_trait::async_trait]
impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "panicking"
    }

    fn description(&self) -> &str {
        "Always panics"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        panic!("tool exploded");
    }
}

/// Sleeps for a fixed delay and remembers the cancellation token it was given.
pub struct SlowTool {
    delay: Duration,
    token: Mutex<Option<CancellationToken>>,
}

impl SlowTool {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            token: Mutex::new(None),
        }
    }

    pub fn observed_cancellation(&self) -> bool {
        self.token
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| t.is_cancelled())
    }
}

#[async_trait::async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn description(&self) -> &str {
        "Takes its time"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, ToolError> {
        *self.token.lock().unwrap() = Some(ctx.cancel.clone());
        tokio::time::sleep(self.delay).await;
        Ok(ToolResult::ok("slow work finished"))
    }
}
