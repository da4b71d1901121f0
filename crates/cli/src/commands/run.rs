//! `agentloop run`: run the agent loop for a single message.

use std::path::Path;
use std::sync::Arc;

use agentloop_agent::AgentLoop;
use agentloop_config::AppConfig;
use agentloop_core::CancellationToken;
use agentloop_core::agent::{RunOutcome, RunResult};
use agentloop_core::event::EventBus;
use agentloop_providers::OpenAiCompatProvider;
use agentloop_tools::SYSTEM_PROMPT;
use tracing::{debug, warn};

pub struct RunArgs {
    pub message: String,
    pub model: Option<String>,
    pub max_iterations: Option<u32>,
    pub json: bool,
}

/// Returns whether the run finished with an answer.
pub async fn run(
    config_path: Option<&Path>,
    args: RunArgs,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export AGENTLOOP_API_KEY='sk-...'");
        eprintln!("    export OPENAI_API_KEY='sk-...'");
        eprintln!();
        eprintln!("  Or add `api_key` to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let tools = Arc::new(agentloop_tools::default_registry()?);
    let event_bus = Arc::new(EventBus::default());

    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(line) = serde_json::to_string(&*event) {
                debug!(target: "agentloop::events", "{line}");
            }
        }
    });

    let mut agent_config = config.agent_config(SYSTEM_PROMPT);
    if let Some(model) = args.model {
        agent_config.model = model;
    }
    if let Some(max) = args.max_iterations {
        agent_config.max_iterations = max;
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            interrupt.cancel();
        }
    });

    let agent = AgentLoop::new(provider, tools, event_bus);
    let result = agent
        .run_with_cancel(args.message, &agent_config, cancel)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        match &result.outcome {
            RunOutcome::Done { answer } => println!("{answer}"),
            RunOutcome::Failed { failure } => eprintln!("  Run failed: {failure}"),
        }
        eprintln!("{}", summary(&result));
    }

    Ok(result.is_success())
}

/// One-line run statistics for the terminal.
fn summary(result: &RunResult) -> String {
    let stats = &result.stats;
    let tools = if stats.tools_used.is_empty() {
        "none".to_string()
    } else {
        stats.tools_used.join(", ")
    };
    format!(
        "  [{} iteration(s), {} provider call(s), {} token(s), tools: {tools}]",
        stats.iterations, stats.provider_calls, stats.usage.total_tokens
    )
}
