//! `agentloop tools`: print the schemas the model is offered.

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = agentloop_tools::default_registry()?;
    println!("{}", serde_json::to_string_pretty(&registry.schemas())?);
    Ok(())
}
