//! `brandloom serve` — Wire up the runtime and start the gateway.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use brandloom_config::AppConfig;
use brandloom_core::ToolRegistry;
use brandloom_core::memory::PersistenceGateway;
use brandloom_gateway::GatewayState;
use brandloom_memory::{InMemoryStore, SqliteStore};
use brandloom_runtime::{AgentRuntime, ModelDiagnostics, RegistryPromptBuilder};
use brandloom_session::SessionRegistry;
use tracing::info;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.validate()?;

    let store: Arc<dyn PersistenceGateway> = match config.memory.backend.as_str() {
        "memory" => {
            info!("Using in-memory persistence (data is lost on exit)");
            Arc::new(InMemoryStore::new())
        }
        _ => {
            info!(path = %config.memory.db_path, "Opening SQLite store");
            Arc::new(SqliteStore::new(&config.memory.db_path).await?)
        }
    };

    let model = brandloom_providers::build_from_config(&config)?;

    let profiles = config.agent_profiles();
    let agent_names: Vec<String> = profiles.iter().map(|p| p.name.clone()).collect();
    info!(agents = agent_names.len(), model = model.id(), "Runtime configured");

    let registry = Arc::new(SessionRegistry::new(
        store,
        agent_names,
        config.memory.capacity,
        config.memory.chat_history_limit,
    ));

    // Concrete tools are registered by deployments; the runtime only needs
    // the registry surface.
    let tools = Arc::new(ToolRegistry::new());
    let prompts = Arc::new(RegistryPromptBuilder::from_file(
        tools.clone(),
        Path::new("system_prompts.json"),
    ));

    let mut runtime = AgentRuntime::new(model.clone(), tools, prompts, profiles)
        .with_dispatch_timeout(Duration::from_secs(config.runtime.dispatch_timeout_secs))
        .with_context_token_budget(config.runtime.context_token_budget);
    if config.runtime.diagnostics {
        runtime = runtime.with_diagnostics(Arc::new(ModelDiagnostics::new(model)));
    }

    let state = Arc::new(GatewayState {
        registry,
        runtime: Arc::new(runtime),
    });

    brandloom_gateway::start(&config.gateway, state).await
}
