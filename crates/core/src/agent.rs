//! Agent configuration and run outcome types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Error;
use crate::message::Transcript;
use crate::provider::Usage;

/// Configuration for one run. Immutable for the run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model identifier passed to the provider
    pub model: String,

    /// Maximum tool rounds before the run fails (must be positive)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// System prompt seeded as the first turn (omitted when empty)
    #[serde(default)]
    pub system_prompt: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate per completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Per-provider-call timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<Duration>,

    /// Per-tool-execution timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout: Option<Duration>,

    /// Run same-round tool calls concurrently
    #[serde(default = "default_true")]
    pub parallel_tool_calls: bool,

    /// Retry policy for transient provider failures
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_iterations() -> u32 {
    10
}
fn default_temperature() -> f32 {
    0.1
}
fn default_true() -> bool {
    true
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_iterations: default_max_iterations(),
            system_prompt: String::new(),
            temperature: default_temperature(),
            max_tokens: None,
            call_timeout: None,
            tool_timeout: None,
            parallel_tool_calls: true,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::Config {
                message: "max_iterations must be at least 1".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::Config {
                message: "temperature must be between 0.0 and 2.0".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config {
                message: "model must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_backoff: Duration,

    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), honouring a server hint.
    pub fn backoff(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let exp = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(retry.min(16)));
        let delay = match retry_after {
            Some(hint) => hint.max(exp),
            None => exp,
        };
        delay.min(self.max_backoff)
    }
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    #[error("iteration limit of {max_iterations} reached without a final answer")]
    IterationLimitExceeded { max_iterations: u32 },

    #[error("provider still failing after {attempts} attempts: {last_error}")]
    ProviderExhausted { attempts: u32, last_error: String },

    #[error("provider rejected the request: {error}")]
    ProviderRejected { error: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl RunFailure {
    /// Short classification label (used in logs and events).
    pub fn label(&self) -> &'static str {
        match self {
            Self::IterationLimitExceeded { .. } => "iteration_limit_exceeded",
            Self::ProviderExhausted { .. } => "provider_exhausted",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::Cancelled => "cancelled",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
        }
    }
}

/// Terminal classification of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Done { answer: String },
    Failed { failure: RunFailure },
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Completed tool rounds
    pub iterations: u32,

    /// Provider calls issued, including retries
    pub provider_calls: u32,

    /// Tool calls dispatched
    pub tool_calls: u32,

    /// Tool names in dispatch order
    pub tools_used: Vec<String>,

    /// Sum of provider-reported usage
    pub usage: Usage,
}

impl RunStats {
    pub fn add_usage(&mut self, usage: &Usage) {
        self.usage.prompt_tokens += usage.prompt_tokens;
        self.usage.completion_tokens += usage.completion_tokens;
        self.usage.total_tokens += usage.total_tokens;
    }
}

/// The terminal outcome of one run. Created once, at loop exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Identifier used in logs and events
    pub run_id: String,

    pub outcome: RunOutcome,

    /// Everything accumulated up to the exit point
    pub transcript: Transcript,

    pub stats: RunStats,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done { .. })
    }

    /// The final answer, if the run completed.
    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Done { answer } => Some(answer),
            RunOutcome::Failed { .. } => None,
        }
    }

    /// The failure classification, if the run failed.
    pub fn failure(&self) -> Option<&RunFailure> {
        match &self.outcome {
            RunOutcome::Done { .. } => None,
            RunOutcome::Failed { failure } => Some(failure),
        }
    }

    pub fn iterations(&self) -> u32 {
        self.stats.iterations
    }
}
