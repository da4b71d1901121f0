//! AgentLoop CLI entry point.
//!
//! Commands:
//! - `run`: run the agent loop for one message
//! - `tools`: print the tool schemas sent to the model
//! - `config`: print, locate or validate the configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "agentloop",
    about = "AgentLoop: bounded tool-calling agent runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Use this config file instead of ~/.agentloop/config.toml
    #[arg(short, long, global = true, env = "AGENTLOOP_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent for a single message
    Run {
        /// The user message that starts the run
        #[arg(short, long)]
        message: String,

        /// Override the configured model
        #[arg(long)]
        model: Option<String>,

        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Print the full run result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the registered tool schemas as JSON
    Tools,

    /// Configuration helpers (prints the default config when no action is given)
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration as TOML
    Default,

    /// Print the config file path
    Path,

    /// Load and validate the active configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only answers and JSON.
    let filter = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            message,
            model,
            max_iterations,
            json,
        } => {
            let args = commands::run::RunArgs {
                message,
                model,
                max_iterations,
                json,
            };
            if !commands::run::run(config_path, args).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Tools => commands::tools::run()?,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Default) {
            ConfigAction::Default => commands::config_cmd::show_default(),
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
    }

    Ok(ExitCode::SUCCESS)
}
