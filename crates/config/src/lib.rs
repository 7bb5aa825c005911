//! Configuration loading, validation, and management for Brandloom.
//!
//! Loads configuration from `brandloom.toml` with environment variable
//! overrides. Validates all settings at startup.

use std::path::{Path, PathBuf};

use brandloom_core::{AgentProfile, stock_profiles};
use serde::{Deserialize, Serialize};

/// The root configuration structure.
///
/// Maps directly to `brandloom.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Memory and persistence settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Gateway (HTTP/WebSocket) settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Execution loop settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Agent profile overrides. Profiles named here replace the stock
    /// profile of the same name; unknown names add new agents.
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// API key. Prefer the `BRANDLOOM_API_KEY` environment variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_model_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("model", &self.model)
            .field("memory", &self.memory)
            .field("gateway", &self.gateway)
            .field("runtime", &self.runtime)
            .field("agents", &self.agents)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Storage backend: "sqlite" or "memory".
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database path. `:memory:` for an ephemeral store.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Ring capacity per (session, agent) memory store.
    #[serde(default = "default_memory_capacity")]
    pub capacity: usize,

    /// How many transcript messages to fold in during hydration.
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
}

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_db_path() -> String {
    "brandloom.db".into()
}
fn default_memory_capacity() -> usize {
    200
}
fn default_chat_history_limit() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            db_path: default_db_path(),
            capacity: default_memory_capacity(),
            chat_history_limit: default_chat_history_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8721
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Per-dispatch deadline in seconds. A dispatch exceeding it is treated
    /// as an ordinary dispatch failure.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    /// Whether failed dispatches are run through diagnostics before being
    /// surfaced as errors.
    #[serde(default = "default_true")]
    pub diagnostics: bool,

    /// Token budget for rendered memory context.
    #[serde(default = "default_context_token_budget")]
    pub context_token_budget: usize,
}

fn default_dispatch_timeout() -> u64 {
    60
}
fn default_context_token_budget() -> usize {
    2000
}
fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_secs: default_dispatch_timeout(),
            diagnostics: true,
            context_token_budget: default_context_token_budget(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`brandloom.toml` in the
    /// working directory), then apply environment variable overrides:
    /// - `BRANDLOOM_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `BRANDLOOM_MODEL`
    /// - `BRANDLOOM_DB_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(Path::new("brandloom.toml"))?;

        if config.model.api_key.is_none() {
            config.model.api_key = std::env::var("BRANDLOOM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("BRANDLOOM_MODEL") {
            config.model.model = model;
        }

        if let Ok(db_path) = std::env::var("BRANDLOOM_DB_PATH") {
            config.memory.db_path = db_path;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.capacity must be greater than 0".into(),
            ));
        }

        if self.memory.backend != "sqlite" && self.memory.backend != "memory" {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory.backend '{}' (expected 'sqlite' or 'memory')",
                self.memory.backend
            )));
        }

        for agent in &self.agents {
            if agent.max_iterations == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}' has max_iterations = 0",
                    agent.name
                )));
            }
        }

        Ok(())
    }

    /// Whether an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// The stock roster with `[[agents]]` overrides applied: a profile named
    /// after a stock agent replaces it, a new name is appended.
    pub fn agent_profiles(&self) -> Vec<AgentProfile> {
        let mut profiles = stock_profiles();
        for agent in &self.agents {
            match profiles.iter_mut().find(|p| p.name == agent.name) {
                Some(slot) => *slot = agent.clone(),
                None => profiles.push(agent.clone()),
            }
        }
        profiles
    }

    /// SQLite connection URL for the configured database path.
    pub fn db_url(&self) -> String {
        if self.memory.db_path == ":memory:" {
            "sqlite::memory:".into()
        } else {
            format!("sqlite://{}?mode=rwc", self.memory.db_path)
        }
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            memory: MemoryConfig::default(),
            gateway: GatewayConfig::default(),
            runtime: RuntimeConfig::default(),
            agents: vec![],
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.capacity, 200);
        assert_eq!(config.gateway.port, 8721);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.memory.capacity, config.memory.capacity);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.model.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut config = AppConfig::default();
        config.memory.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/brandloom.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().memory.backend, "sqlite");
    }

    #[test]
    fn agent_overrides_parse() {
        let toml_str = r#"
[[agents]]
name = "orchestrator"
description = "custom orchestrator"
max_iterations = 3
allowed_agents = ["research_agent"]

[[agents]]
name = "night_shift"
description = "a new agent"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].max_iterations, 3);
        assert_eq!(config.agents[1].max_iterations, 5);
    }

    #[test]
    fn agent_profiles_merge_into_stock_roster() {
        let toml_str = r#"
[[agents]]
name = "orchestrator"
description = "custom orchestrator"
max_iterations = 3

[[agents]]
name = "night_shift"
description = "a new agent"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let profiles = config.agent_profiles();

        // The stock roster survives, with the named override applied and the
        // new agent appended
        assert_eq!(profiles.len(), stock_profiles().len() + 1);
        let orch = profiles.iter().find(|p| p.name == "orchestrator").unwrap();
        assert_eq!(orch.max_iterations, 3);
        assert!(profiles.iter().any(|p| p.name == "night_shift"));
        assert!(profiles.iter().any(|p| p.name == "research_agent"));
    }

    #[test]
    fn empty_agents_section_yields_stock_roster() {
        let config = AppConfig::default();
        assert_eq!(config.agent_profiles().len(), stock_profiles().len());
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.model.api_key = Some("sk-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn load_from_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[gateway]\nport = 9000").unwrap();
        let config = AppConfig::load_from(f.path()).unwrap();
        assert_eq!(config.gateway.port, 9000);
    }

    #[test]
    fn memory_db_url_forms() {
        let mut config = AppConfig::default();
        config.memory.db_path = ":memory:".into();
        assert_eq!(config.db_url(), "sqlite::memory:");
        config.memory.db_path = "data/app.db".into();
        assert!(config.db_url().starts_with("sqlite://data/app.db"));
    }
}
