//! `brandloom status` — Show the resolved configuration.

use brandloom_config::AppConfig;
use std::path::Path;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let agent_count = config.agent_profiles().len();

    println!("Brandloom Status");
    println!("================");
    println!("  Model:        {}", config.model.model);
    println!("  Endpoint:     {}", config.model.api_url);
    println!(
        "  API key:      {}",
        if config.has_api_key() { "configured" } else { "missing" }
    );
    println!("  Memory:       {}", config.memory.backend);
    println!("  Database:     {}", config.memory.db_path);
    println!("  Capacity:     {} entries/agent", config.memory.capacity);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Diagnostics:  {}",
        if config.runtime.diagnostics { "enabled" } else { "disabled" }
    );
    println!("  Agents:       {agent_count}");

    if !Path::new("brandloom.toml").exists() {
        println!("\n  No config file — using defaults. Run `brandloom init` to create one.");
    }

    Ok(())
}
