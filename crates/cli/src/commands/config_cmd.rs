//! `agentloop config`: configuration management commands.

use std::path::Path;

use agentloop_config::AppConfig;

pub fn show_default() {
    println!("{}", AppConfig::default_toml());
}

pub fn path(config_path: Option<&Path>) {
    match config_path {
        Some(path) => println!("{}", path.display()),
        None => println!("{}", AppConfig::config_dir().join("config.toml").display()),
    }
}

pub fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match super::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };
    println!("   Config parsed successfully");

    if config.has_api_key() {
        println!("   All checks passed");
    } else {
        println!();
        println!("   Warning: no API key set (set AGENTLOOP_API_KEY or OPENAI_API_KEY)");
    }

    let agent = &config.agent;
    println!();
    println!("   Provider:        {}", config.provider);
    println!("   Base URL:        {}", config.base_url);
    println!("   Model:           {}", agent.model);
    println!("   Max iterations:  {}", agent.max_iterations);
    println!("   Parallel tools:  {}", agent.parallel_tool_calls);
    println!("   Max retries:     {}", agent.retry.max_retries);

    Ok(())
}
