//! The agent loop implementation.

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use agentloop_core::CancellationToken;
use agentloop_core::agent::{AgentConfig, RunFailure, RunOutcome, RunResult, RunStats};
use agentloop_core::error::{Error, ProviderError, ToolError};
use agentloop_core::event::{DomainEvent, EventBus};
use agentloop_core::message::{ToolCallRequest, Transcript, Turn};
use agentloop_core::provider::{CompletionOutcome, Provider, ProviderResponse, ToolSchema};
use agentloop_core::tool::{ToolContext, ToolRegistry, ToolResult, check_arguments};
use chrono::Utc;
use futures::{FutureExt, StreamExt, stream};
use tracing::{Instrument, debug, info, info_span, warn};

/// Error detail carried by the failed result of an unregistered tool name.
pub const UNKNOWN_TOOL: &str = "unknown tool";

/// Error detail carried by results of calls interrupted by cancellation.
const CANCELLED: &str = "cancelled";

/// Drives runs against one provider and one tool registry.
///
/// Holds no per-run state: a single `AgentLoop` (or several sharing the same
/// registry) can serve concurrent runs.
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// Tool registry, read-only for the loop's lifetime
    tools: Arc<ToolRegistry>,

    /// Event bus for domain events
    event_bus: Arc<EventBus>,
}

/// Where a run currently stands.
enum RunState {
    Init(String),
    AwaitingModel,
    AwaitingTools(Vec<ToolCallRequest>),
    Final(String),
    Done(String),
    Failed(RunFailure),
}

/// Mutable state owned by one run.
struct Run<'a> {
    id: String,
    config: &'a AgentConfig,
    transcript: Transcript,
    stats: RunStats,
    schemas: Vec<ToolSchema>,
    cancel: CancellationToken,
    /// Every call id handed out so far, so each result maps to one request.
    call_ids: HashSet<String>,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            provider,
            tools,
            event_bus,
        }
    }

    /// Run the loop for one user message until it terminates.
    ///
    /// Never returns an error: every exit path (answer, iteration cap,
    /// provider failure, bad configuration) is classified in the
    /// [`RunResult`], which also carries the transcript accumulated so far.
    pub async fn run(&self, message: impl Into<String>, config: &AgentConfig) -> RunResult {
        self.run_with_cancel(message, config, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but stops early once `cancel` fires.
    ///
    /// Tools still executing are signalled through their context token and
    /// dropped; each unanswered call of the round gets a failed "cancelled"
    /// result so the transcript stays consistent.
    pub async fn run_with_cancel(
        &self,
        message: impl Into<String>,
        config: &AgentConfig,
        cancel: CancellationToken,
    ) -> RunResult {
        let run = Run {
            id: uuid::Uuid::new_v4().to_string(),
            config,
            transcript: Transcript::new(),
            stats: RunStats::default(),
            schemas: self.tools.schemas(),
            cancel,
            call_ids: HashSet::new(),
        };
        let span = info_span!("agent_run", run_id = %run.id, model = %config.model);
        self.drive(run, message.into()).instrument(span).await
    }

    async fn drive(&self, mut run: Run<'_>, message: String) -> RunResult {
        let mut state = RunState::Init(message);

        let outcome = loop {
            state = match state {
                RunState::Init(message) => self.init(&mut run, message),
                RunState::AwaitingModel => self.await_model(&mut run).await,
                RunState::AwaitingTools(calls) => self.await_tools(&mut run, calls).await,
                RunState::Final(answer) => {
                    run.transcript.push(Turn::assistant(answer.clone()));
                    RunState::Done(answer)
                }
                RunState::Done(answer) => break RunOutcome::Done { answer },
                RunState::Failed(failure) => break RunOutcome::Failed { failure },
            };
        };

        self.finish(run, outcome)
    }

    fn init(&self, run: &mut Run<'_>, message: String) -> RunState {
        if let Err(e) = run.config.validate() {
            let reason = match e {
                Error::Config { message } => message,
                other => other.to_string(),
            };
            warn!(%reason, "Rejecting run configuration");
            return RunState::Failed(RunFailure::InvalidConfiguration { reason });
        }

        if !run.config.system_prompt.is_empty() {
            run.transcript.push(Turn::system(run.config.system_prompt.clone()));
        }
        run.transcript.push(Turn::user(message));

        info!(
            max_iterations = run.config.max_iterations,
            tools = run.schemas.len(),
            "Starting run"
        );
        self.event_bus.publish(DomainEvent::RunStarted {
            run_id: run.id.clone(),
            model: run.config.model.clone(),
            max_iterations: run.config.max_iterations,
            tool_count: run.schemas.len(),
            timestamp: Utc::now(),
        });

        RunState::AwaitingModel
    }

    async fn await_model(&self, run: &mut Run<'_>) -> RunState {
        if run.cancel.is_cancelled() {
            return RunState::Failed(RunFailure::Cancelled);
        }

        let response = match self.call_provider(run).await {
            Ok(response) => response,
            Err(failure) => return RunState::Failed(failure),
        };
        if let Some(usage) = &response.usage {
            run.stats.add_usage(usage);
        }

        match response.outcome {
            CompletionOutcome::FinalAnswer { text } => RunState::Final(text),
            // A tool-call response without calls is an answer in disguise.
            CompletionOutcome::ToolCallsRequested { content, calls } if calls.is_empty() => {
                RunState::Final(content.unwrap_or_default())
            }
            CompletionOutcome::ToolCallsRequested { content, mut calls } => {
                let round = run.stats.iterations + 1;
                for (index, call) in calls.iter_mut().enumerate() {
                    if call.id.trim().is_empty() || run.call_ids.contains(&call.id) {
                        call.id = fresh_call_id(&run.call_ids, round, index);
                    }
                    run.call_ids.insert(call.id.clone());
                }

                debug!(round, tool_count = calls.len(), "Model requested tools");
                run.transcript
                    .push(Turn::assistant_tool_calls(content, calls.clone()));
                RunState::AwaitingTools(calls)
            }
        }
    }

    /// Call the provider, retrying transient failures with backoff.
    async fn call_provider(&self, run: &mut Run<'_>) -> Result<ProviderResponse, RunFailure> {
        let round = run.stats.iterations + 1;
        let retry = &run.config.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            run.stats.provider_calls += 1;

            let started = Instant::now();
            let call = self
                .provider
                .complete(&run.transcript, &run.schemas, run.config);
            let result = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => return Err(RunFailure::Cancelled),
                result = with_timeout(run.config.call_timeout, call) => result,
            };
            self.publish_round_trip(run, round, attempt, &result, started.elapsed());

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!(round, error = %error, "Provider rejected the request");
                return Err(RunFailure::ProviderRejected {
                    error: error.to_string(),
                });
            }
            if attempt > retry.max_retries {
                warn!(round, attempts = attempt, error = %error, "Provider retries exhausted");
                return Err(RunFailure::ProviderExhausted {
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            let delay = retry.backoff(
                attempt - 1,
                error.retry_after_secs().map(Duration::from_secs),
            );
            warn!(
                round,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient provider failure, retrying"
            );
            tokio::select! {
                biased;
                _ = run.cancel.cancelled() => return Err(RunFailure::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn publish_round_trip(
        &self,
        run: &Run<'_>,
        round: u32,
        attempt: u32,
        result: &Result<ProviderResponse, ProviderError>,
        elapsed: Duration,
    ) {
        let (outcome, tool_calls, tokens_used, error) = match result {
            Ok(response) => {
                let (outcome, calls) = match &response.outcome {
                    CompletionOutcome::FinalAnswer { .. } => ("final_answer", 0),
                    CompletionOutcome::ToolCallsRequested { calls, .. } => {
                        ("tool_calls", calls.len())
                    }
                };
                (
                    outcome,
                    calls,
                    response.usage.map(|u| u.total_tokens),
                    None,
                )
            }
            Err(e) => ("error", 0, None, Some(e.to_string())),
        };

        self.event_bus.publish(DomainEvent::ProviderRoundTrip {
            run_id: run.id.clone(),
            round,
            attempt,
            transcript_len: run.transcript.len(),
            outcome: outcome.to_string(),
            tool_calls,
            tokens_used,
            error,
            duration_ms: elapsed.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }

    async fn await_tools(&self, run: &mut Run<'_>, calls: Vec<ToolCallRequest>) -> RunState {
        let round = run.stats.iterations + 1;
        let limit = if run.config.parallel_tool_calls {
            calls.len().max(1)
        } else {
            1
        };

        let mut slots: Vec<Option<ToolResult>> = vec![None; calls.len()];
        let cancelled = {
            let run: &Run<'_> = run;
            let mut pending = stream::iter(calls.iter().enumerate())
                .map(|(index, call)| async move {
                    (index, self.invoke_tool(run, round, call).await)
                })
                .buffer_unordered(limit);

            loop {
                tokio::select! {
                    biased;
                    _ = run.cancel.cancelled() => break true,
                    next = pending.next() => match next {
                        Some((index, result)) => slots[index] = Some(result),
                        None => break false,
                    },
                }
            }
        };

        for (call, slot) in calls.iter().zip(slots) {
            let result = slot.unwrap_or_else(|| {
                ToolResult::failure(
                    format!("Tool {} was cancelled before it finished", call.name),
                    CANCELLED,
                )
            });
            run.stats.tool_calls += 1;
            run.stats.tools_used.push(call.name.clone());
            run.transcript.push(Turn::tool_result(call.id.clone(), result));
        }

        if cancelled {
            warn!(round, "Run cancelled while tools were executing");
            return RunState::Failed(RunFailure::Cancelled);
        }

        run.stats.iterations += 1;
        if run.stats.iterations >= run.config.max_iterations {
            warn!(
                iterations = run.stats.iterations,
                "Max tool iterations reached without a final answer"
            );
            return RunState::Failed(RunFailure::IterationLimitExceeded {
                max_iterations: run.config.max_iterations,
            });
        }

        RunState::AwaitingModel
    }

    /// Execute one call and publish its outcome. Never fails.
    async fn invoke_tool(&self, run: &Run<'_>, round: u32, call: &ToolCallRequest) -> ToolResult {
        let started = Instant::now();
        let ctx = ToolContext::new(call.id.clone(), run.cancel.child_token());
        let result = self.execute_call(call, &ctx, run.config.tool_timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if result.success {
            debug!(tool = %call.name, call_id = %call.id, duration_ms, "Tool succeeded");
        } else {
            warn!(
                tool = %call.name,
                call_id = %call.id,
                error = result.error.as_deref().unwrap_or(""),
                "Tool failed"
            );
        }

        self.event_bus.publish(DomainEvent::ToolExecuted {
            run_id: run.id.clone(),
            round,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            success: result.success,
            message: result.message.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn execute_call(
        &self,
        call: &ToolCallRequest,
        ctx: &ToolContext,
        timeout: Option<Duration>,
    ) -> ToolResult {
        let Ok(tool) = self.tools.get(&call.name) else {
            return ToolResult::failure(format!("Unknown tool: {}", call.name), UNKNOWN_TOOL);
        };

        if let Err(e) = check_arguments(&tool.parameters_schema(), &call.arguments) {
            return ToolResult::failure(
                format!("Invalid arguments for {}: {e}", call.name),
                e.to_string(),
            );
        }

        let execution = AssertUnwindSafe(tool.execute(call.arguments.clone(), ctx)).catch_unwind();
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_ms: limit.as_millis() as u64,
                })),
            },
            None => execution.await,
        };

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                ToolResult::failure(format!("Error executing {}: {e}", call.name), e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                ToolResult::failure(format!("Tool {} panicked: {reason}", call.name), reason)
            }
        }
    }

    fn finish(&self, run: Run<'_>, outcome: RunOutcome) -> RunResult {
        let status = match &outcome {
            RunOutcome::Done { .. } => {
                info!(
                    iterations = run.stats.iterations,
                    provider_calls = run.stats.provider_calls,
                    turns = run.transcript.len(),
                    "Run completed"
                );
                "done"
            }
            RunOutcome::Failed { failure } => {
                warn!(
                    iterations = run.stats.iterations,
                    turns = run.transcript.len(),
                    %failure,
                    "Run failed"
                );
                failure.label()
            }
        };

        self.event_bus.publish(DomainEvent::RunFinished {
            run_id: run.id.clone(),
            status: status.to_string(),
            iterations: run.stats.iterations,
            transcript_len: run.transcript.len(),
            timestamp: Utc::now(),
        });

        RunResult {
            run_id: run.id,
            outcome,
            transcript: run.transcript,
            stats: run.stats,
        }
    }
}

/// Bound a provider call by the configured timeout, if any.
async fn with_timeout<F>(
    limit: Option<Duration>,
    call: F,
) -> Result<ProviderResponse, ProviderError>
where
    F: Future<Output = Result<ProviderResponse, ProviderError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(ProviderError::Timeout(format!(
                "no response within {}ms",
                limit.as_millis()
            )))
        }),
        None => call.await,
    }
}

/// `call_{round}_{index}`, suffixed until it is unused in the run.
fn fresh_call_id(used: &HashSet<String>, round: u32, index: usize) -> String {
    let base = format!("call_{round}_{index}");
    let mut id = base.clone();
    let mut n = 1;
    while used.contains(&id) {
        id = format!("{base}_{n}");
        n += 1;
    }
    id
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use agentloop_core::agent::RetryPolicy;
    use agentloop_core::message::Role;
    use agentloop_core::provider::Usage;

    fn agent(provider: Arc<dyn Provider>, tools: ToolRegistry) -> AgentLoop {
        AgentLoop::new(provider, Arc::new(tools), Arc::new(EventBus::default()))
    }

    fn config() -> AgentConfig {
        AgentConfig::new("mock-model").with_system_prompt("You are a test assistant.")
    }

    fn tool_result_of(turn: &Turn) -> &ToolResult {
        turn.tool_result.as_ref().expect("tool result turn")
    }

    #[tokio::test]
    async fn final_answer_on_first_round() {
        let provider = Arc::new(SequentialMockProvider::single_text("Hello! How can I help?"));
        let agent = agent(provider.clone(), ToolRegistry::new());

        let result = agent.run("Hello!", &config()).await;

        assert!(result.is_success());
        assert_eq!(result.answer(), Some("Hello! How can I help?"));
        // System + User + Assistant
        assert_eq!(result.transcript.len(), 3);
        let roles: Vec<Role> = result.transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
        assert_eq!(result.iterations(), 0);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(result.stats.usage.total_tokens, 15);
    }

    #[tokio::test]
    async fn empty_system_prompt_is_omitted() {
        let provider = Arc::new(SequentialMockProvider::single_text("hi"));
        let agent = agent(provider, ToolRegistry::new());

        let result = agent.run("Hello!", &AgentConfig::new("mock-model")).await;

        assert_eq!(result.transcript.len(), 2);
        assert_eq!(result.transcript.turns()[0].role, Role::User);
    }

    #[tokio::test]
    async fn iteration_limit_of_one() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Ok(
            make_tool_call_response(vec![make_call("call_1", "echo", serde_json::json!({"text": "a"}))]),
        )]));
        let agent = agent(provider.clone(), registry_with_echo());

        let result = agent.run("go", &config().with_max_iterations(1)).await;

        assert_eq!(
            result.failure(),
            Some(&RunFailure::IterationLimitExceeded { max_iterations: 1 })
        );
        // System + User + Assistant(calls) + Tool
        assert_eq!(result.transcript.len(), 4);
        assert_eq!(result.iterations(), 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn iteration_counter_never_exceeds_maximum() {
        let responses = (0..10)
            .map(|i| {
                Ok(make_tool_call_response(vec![make_call(
                    &format!("call_{i}"),
                    "echo",
                    serde_json::json!({"text": "again"}),
                )]))
            })
            .collect();
        let provider = Arc::new(SequentialMockProvider::new(responses));
        let agent = agent(provider.clone(), registry_with_echo());

        let result = agent.run("loop forever", &config().with_max_iterations(3)).await;

        assert_eq!(result.iterations(), 3);
        assert_eq!(provider.call_count(), 3);
        assert!(matches!(
            result.failure(),
            Some(RunFailure::IterationLimitExceeded { max_iterations: 3 })
        ));
    }

    #[tokio::test]
    async fn unknown_tool_then_known_tool() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_tool_call_response(vec![
                make_call("call_a", "does_not_exist", serde_json::json!({})),
                make_call("call_b", "echo", serde_json::json!({"text": "hi"})),
            ])),
            Ok(make_text_response("done")),
        ]));
        let agent = agent(provider.clone(), registry_with_echo());

        let result = agent.run("go", &config()).await;

        assert!(result.is_success());
        assert_eq!(provider.call_count(), 2);

        let turns = result.transcript.turns();
        assert_eq!(turns[3].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(turns[4].tool_call_id.as_deref(), Some("call_b"));

        let unknown = tool_result_of(&turns[3]);
        assert!(!unknown.success);
        assert_eq!(unknown.error.as_deref(), Some(UNKNOWN_TOOL));
        assert!(tool_result_of(&turns[4]).success);
        assert_eq!(result.stats.tools_used, vec!["does_not_exist", "echo"]);
    }

    #[tokio::test]
    async fn tool_error_does_not_end_run() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("call_1", "failing", serde_json::json!({}))],
            "I could not do that.",
        ));
        let tools = ToolRegistry::new().with(Arc::new(FailingTool)).unwrap();
        let agent = agent(provider, tools);

        let result = agent.run("go", &config()).await;

        assert!(result.is_success());
        let failed = tool_result_of(&result.transcript.turns()[3]);
        assert!(!failed.success);
        assert!(failed.error.as_deref().unwrap().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn tool_panic_does_not_end_run() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("call_1", "panicking", serde_json::json!({}))],
            "recovered",
        ));
        let tools = ToolRegistry::new().with(Arc::new(PanickingTool)).unwrap();
        let agent = agent(provider, tools);

        let result = agent.run("go", &config()).await;

        assert_eq!(result.answer(), Some("recovered"));
        let failed = tool_result_of(&result.transcript.turns()[3]);
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("tool exploded"));
    }

    #[tokio::test]
    async fn schema_violation_is_a_failed_result() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("call_1", "echo", serde_json::json!({"text": 42}))],
            "ok",
        ));
        let agent = agent(provider, registry_with_echo());

        let result = agent.run("go", &config()).await;

        assert!(result.is_success());
        let failed = tool_result_of(&result.transcript.turns()[3]);
        assert!(!failed.success);
        assert!(failed.message.starts_with("Invalid arguments for echo"));
    }

    #[tokio::test]
    async fn empty_call_ids_get_generated() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![
                make_call("", "echo", serde_json::json!({"text": "a"})),
                make_call("", "echo", serde_json::json!({"text": "b"})),
            ],
            "ok",
        ));
        let agent = agent(provider, registry_with_echo());

        let result = agent.run("go", &config()).await;

        let turns = result.transcript.turns();
        let ids: Vec<&str> = turns[2].tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_1_0", "call_1_1"]);
        assert_eq!(turns[3].tool_call_id.as_deref(), Some("call_1_0"));
        assert_eq!(turns[4].tool_call_id.as_deref(), Some("call_1_1"));
    }

    #[tokio::test]
    async fn duplicate_and_colliding_call_ids_are_renamed() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_tool_call_response(vec![
                make_call("dup", "echo", serde_json::json!({"text": "a"})),
                make_call("dup", "echo", serde_json::json!({"text": "b"})),
            ])),
            Ok(make_tool_call_response(vec![
                make_call("", "echo", serde_json::json!({"text": "c"})),
                make_call("call_2_0", "echo", serde_json::json!({"text": "d"})),
            ])),
            Ok(make_text_response("ok")),
        ]));
        let agent = agent(provider, registry_with_echo());

        let result = agent.run("go", &config()).await;

        assert_eq!(result.answer(), Some("ok"));
        let turns = result.transcript.turns();
        let requested: Vec<&str> = turns
            .iter()
            .flat_map(|t| t.tool_calls.iter().map(|c| c.id.as_str()))
            .collect();
        assert_eq!(requested, vec!["dup", "call_1_1", "call_2_0", "call_2_1"]);

        let answered: Vec<&str> = turns
            .iter()
            .filter_map(|t| t.tool_call_id.as_deref())
            .collect();
        assert_eq!(answered, requested);
        let unique: HashSet<&str> = answered.iter().copied().collect();
        assert_eq!(unique.len(), answered.len());

        assert_eq!(tool_result_of(&turns[3]).message, "a");
        assert_eq!(tool_result_of(&turns[4]).message, "b");
        assert_eq!(tool_result_of(&turns[6]).message, "c");
        assert_eq!(tool_result_of(&turns[7]).message, "d");
        assert!(result.transcript.unanswered_calls().is_empty());
    }

    #[tokio::test]
    async fn null_required_argument_is_a_schema_violation() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("c1", "echo", serde_json::json!({"text": null}))],
            "ok",
        ));
        let agent = agent(provider, registry_with_echo());

        let result = agent.run("go", &config()).await;

        assert!(result.is_success());
        let failed = tool_result_of(&result.transcript.turns()[3]);
        assert!(!failed.success);
        assert!(failed.message.starts_with("Invalid arguments for echo"));
        assert!(failed.message.contains("missing required argument 'text'"));
    }

    #[tokio::test]
    async fn empty_call_list_is_a_final_answer() {
        let response = ProviderResponse {
            outcome: CompletionOutcome::ToolCallsRequested {
                content: Some("nothing to do".into()),
                calls: vec![],
            },
            usage: None,
            model: "mock-model".into(),
        };
        let provider = Arc::new(SequentialMockProvider::new(vec![Ok(response)]));
        let agent = agent(provider, ToolRegistry::new());

        let result = agent.run("go", &config()).await;

        assert_eq!(result.answer(), Some("nothing to do"));
        assert_eq!(result.transcript.len(), 3);
    }

    #[tokio::test]
    async fn every_call_answered_exactly_once_per_round() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Ok(make_tool_call_response(vec![
                make_call("r1_a", "echo", serde_json::json!({"text": "1"})),
                make_call("r1_b", "echo", serde_json::json!({"text": "2"})),
                make_call("r1_c", "echo", serde_json::json!({"text": "3"})),
            ])),
            Ok(make_tool_call_response(vec![make_call(
                "r2_a",
                "echo",
                serde_json::json!({"text": "4"}),
            )])),
            Ok(make_text_response("done")),
        ]));
        let agent = agent(provider.clone(), registry_with_echo());

        let result = agent.run("go", &config()).await;

        assert!(result.is_success());
        assert_eq!(result.iterations(), 2);
        assert_eq!(result.stats.tool_calls, 4);
        for seen in provider.seen_transcripts() {
            assert!(seen.unanswered_calls().is_empty());
        }
        let answered: Vec<&str> = result
            .transcript
            .turns()
            .iter()
            .filter_map(|t| t.tool_call_id.as_deref())
            .collect();
        assert_eq!(answered, vec!["r1_a", "r1_b", "r1_c", "r2_a"]);
    }

    #[tokio::test]
    async fn identical_input_gives_identical_transcripts() {
        let cfg = config();
        let make_agent = || {
            agent(
                Arc::new(ReflexProvider),
                registry_with_echo(),
            )
        };

        let first = make_agent().run("repeat me", &cfg).await;
        let second = make_agent().run("repeat me", &cfg).await;

        assert!(first.is_success());
        assert_eq!(first.transcript, second.transcript);
        assert_ne!(first.run_id, second.run_id);
    }

    #[tokio::test]
    async fn concurrent_runs_share_a_registry() {
        let agent = agent(Arc::new(ReflexProvider), registry_with_echo());
        let cfg = config();

        let (a, b) = futures::join!(agent.run("alpha", &cfg), agent.run("beta", &cfg));

        assert_eq!(a.answer(), Some("echoed: alpha"));
        assert_eq!(b.answer(), Some("echoed: beta"));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Err(ProviderError::Network("connection reset".into())),
            Err(ProviderError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            }),
            Ok(make_text_response("finally")),
        ]));
        let agent = agent(provider.clone(), ToolRegistry::new());

        let started = tokio::time::Instant::now();
        let result = agent.run("go", &config()).await;

        assert_eq!(result.answer(), Some("finally"));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(result.stats.provider_calls, 3);
        // 500ms + 1000ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let provider = Arc::new(SequentialMockProvider::new(
            (0..5)
                .map(|_| Err(ProviderError::RateLimited { retry_after_secs: 1 }))
                .collect(),
        ));
        let agent = agent(provider.clone(), ToolRegistry::new());
        let cfg = config().with_retry(RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        });

        let result = agent.run("go", &cfg).await;

        match result.failure() {
            Some(RunFailure::ProviderExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(*attempts, 3);
                assert!(last_error.contains("Rate limited"));
            }
            other => panic!("expected ProviderExhausted, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 3);
        assert_eq!(result.transcript.len(), 2);
    }

    #[tokio::test]
    async fn fatal_provider_error_is_not_retried() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let agent = agent(provider.clone(), ToolRegistry::new());

        let result = agent.run("go", &config()).await;

        assert!(matches!(
            result.failure(),
            Some(RunFailure::ProviderRejected { .. })
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = Arc::new(
            SequentialMockProvider::single_text("too late").with_delay(Duration::from_secs(30)),
        );
        let agent = agent(provider, ToolRegistry::new());
        let cfg = config()
            .with_call_timeout(Duration::from_secs(1))
            .with_retry(RetryPolicy::none());

        let result = agent.run("go", &cfg).await;

        match result.failure() {
            Some(RunFailure::ProviderExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(*attempts, 1);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected ProviderExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_configuration_fails_before_provider() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let agent = agent(provider.clone(), ToolRegistry::new());

        for cfg in [
            config().with_max_iterations(0),
            config().with_temperature(3.5),
        ] {
            let result = agent.run("go", &cfg).await;
            assert!(matches!(
                result.failure(),
                Some(RunFailure::InvalidConfiguration { .. })
            ));
            assert!(result.transcript.is_empty());
        }
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let agent = agent(provider.clone(), ToolRegistry::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = agent.run_with_cancel("go", &config(), cancel).await;

        assert_eq!(result.failure(), Some(&RunFailure::Cancelled));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(result.transcript.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_tools() {
        let slow = Arc::new(SlowTool::new(Duration::from_secs(60)));
        let provider = Arc::new(SequentialMockProvider::new(vec![Ok(
            make_tool_call_response(vec![
                make_call("call_fast", "echo", serde_json::json!({"text": "quick"})),
                make_call("call_slow", "slow", serde_json::json!({})),
            ]),
        )]));
        let tools = registry_with_echo().with(slow.clone()).unwrap();
        let agent = agent(provider, tools);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result = agent.run_with_cancel("go", &config(), cancel).await;

        assert_eq!(result.failure(), Some(&RunFailure::Cancelled));
        let turns = result.transcript.turns();
        assert_eq!(turns.len(), 5);
        assert!(tool_result_of(&turns[3]).success);
        let interrupted = tool_result_of(&turns[4]);
        assert!(!interrupted.success);
        assert_eq!(interrupted.error.as_deref(), Some("cancelled"));
        assert!(result.transcript.unanswered_calls().is_empty());
        assert!(slow.observed_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn parallel_calls_overlap_and_keep_order() {
        let provider = || {
            Arc::new(SequentialMockProvider::tool_then_answer(
                vec![
                    make_call("call_1", "slow", serde_json::json!({})),
                    make_call("call_2", "slow", serde_json::json!({})),
                ],
                "done",
            ))
        };
        let tools = || {
            ToolRegistry::new()
                .with(Arc::new(SlowTool::new(Duration::from_millis(100))))
                .unwrap()
        };

        let started = tokio::time::Instant::now();
        let parallel = agent(provider(), tools()).run("go", &config()).await;
        let parallel_elapsed = started.elapsed();

        let started = tokio::time::Instant::now();
        let sequential = agent(provider(), tools())
            .run("go", &config().with_parallel_tool_calls(false))
            .await;
        let sequential_elapsed = started.elapsed();

        assert!(parallel_elapsed < Duration::from_millis(200));
        assert!(sequential_elapsed >= Duration::from_millis(200));
        assert_eq!(parallel.transcript, sequential.transcript);
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout_yields_failed_result() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("call_1", "slow", serde_json::json!({}))],
            "gave up",
        ));
        let tools = ToolRegistry::new()
            .with(Arc::new(SlowTool::new(Duration::from_secs(60))))
            .unwrap();
        let agent = agent(provider, tools);

        let result = agent
            .run("go", &config().with_tool_timeout(Duration::from_secs(1)))
            .await;

        assert!(result.is_success());
        let failed = tool_result_of(&result.transcript.turns()[3]);
        assert!(failed.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn events_follow_the_run() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("call_1", "echo", serde_json::json!({"text": "x"}))],
            "done",
        ));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let agent = AgentLoop::new(provider, Arc::new(registry_with_echo()), bus);

        let result = agent.run("go", &config()).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.run_id() == result.run_id));
        assert!(matches!(*events[0], DomainEvent::RunStarted { tool_count: 1, .. }));
        assert!(matches!(
            &*events[1],
            DomainEvent::ProviderRoundTrip { outcome, tool_calls: 1, .. } if outcome == "tool_calls"
        ));
        assert!(matches!(
            &*events[2],
            DomainEvent::ToolExecuted { tool_name, success: true, .. } if tool_name == "echo"
        ));
        assert!(matches!(
            &*events[3],
            DomainEvent::ProviderRoundTrip { outcome, round: 2, .. } if outcome == "final_answer"
        ));
        assert!(matches!(
            &*events[4],
            DomainEvent::RunFinished { status, iterations: 1, .. } if status == "done"
        ));
    }

    #[tokio::test]
    async fn usage_is_accumulated() {
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_call("call_1", "echo", serde_json::json!({"text": "x"}))],
            "done",
        ));
        let agent = agent(provider, registry_with_echo());

        let result = agent.run("go", &config()).await;

        assert_eq!(
            result.stats.usage,
            Usage {
                prompt_tokens: 20,
                completion_tokens: 10,
                total_tokens: 30,
            }
        );
    }

    #[test]
    fn panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }
}
