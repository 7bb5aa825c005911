//! Agent profiles.
//!
//! Every agent is the same generic execution loop parametrized by a profile:
//! a prompt role, an allow-list of delegation targets and tools, and an
//! iteration cap. Adding an agent means adding a profile, not a new loop.

use serde::{Deserialize, Serialize};

/// Default iteration cap for most agents.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Named configuration of the execution loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Unique agent name, as referenced in delegation decisions.
    pub name: String,

    /// One-line role description, advertised to delegating agents.
    pub description: String,

    /// Hard cap on model round-trips per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Agents this agent may delegate to. A delegation naming anything else
    /// is a terminal error.
    #[serde(default)]
    pub allowed_agents: Vec<String>,

    /// Tools this agent may invoke.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            allowed_agents: Vec::new(),
            allowed_tools: Vec::new(),
        }
    }

    pub fn with_max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = cap;
        self
    }

    pub fn with_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows_agent(&self, name: &str) -> bool {
        self.allowed_agents.iter().any(|a| a == name)
    }

    pub fn allows_tool(&self, name: &str) -> bool {
        self.allowed_tools.iter().any(|t| t == name)
    }
}

/// The built-in agent roster. Configuration can override or extend it.
pub fn stock_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "orchestrator",
            "Central coordinator that routes queries to specialized agents",
        )
        .with_agents([
            "research_agent",
            "asset_agent",
            "media_analyst",
            "social_media_search_agent",
            "media_activist",
            "copy_writer",
            "content_creator",
            "social_media_manager",
            "todo_planner",
        ]),
        AgentProfile::new(
            "content_creator",
            "Plans and produces content, delegating research and asset work",
        )
        .with_max_iterations(8)
        .with_agents([
            "asset_agent",
            "media_analyst",
            "social_media_search_agent",
            "research_agent",
        ])
        .with_tools(["content_planner", "media_generation"]),
        AgentProfile::new(
            "social_media_manager",
            "Coordinates publishing workflows across social platforms",
        )
        .with_agents([
            "research_agent",
            "asset_agent",
            "media_analyst",
            "social_media_search_agent",
            "media_activist",
            "copy_writer",
        ])
        .with_tools(["publisher", "get_media"]),
        AgentProfile::new(
            "research_agent",
            "Performs grounded searches and synthesizes findings with citations",
        )
        .with_tools(["unified_search", "unified_scraper"]),
        AgentProfile::new(
            "asset_agent",
            "Generates, stores and indexes assets, returning structured metadata",
        )
        .with_tools(["asset_store", "sheet_reader", "sheet_append", "sheet_update"]),
        AgentProfile::new(
            "media_analyst",
            "Analyzes media files and extracts structured insights",
        )
        .with_tools(["get_media", "unified_scraper"]),
        AgentProfile::new(
            "social_media_search_agent",
            "Searches social platforms for posts, trends and accounts",
        )
        .with_tools(["unified_search"]),
        AgentProfile::new(
            "media_activist",
            "Drafts engagement actions and platform-specific responses",
        )
        .with_tools(["unified_search", "get_media"]),
        AgentProfile::new("copy_writer", "Writes and refines short-form copy"),
        AgentProfile::new(
            "todo_planner",
            "Maintains task plans and tracks step completion",
        )
        .with_tools(["todo_manager"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_roster_has_unique_names() {
        let profiles = stock_profiles();
        let mut names: Vec<&str> = profiles.iter().map(|p| p.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), profiles.len());
    }

    #[test]
    fn orchestrator_delegates_but_holds_no_tools() {
        let profiles = stock_profiles();
        let orch = profiles.iter().find(|p| p.name == "orchestrator").unwrap();
        assert!(orch.allows_agent("research_agent"));
        assert!(orch.allowed_tools.is_empty());
    }

    #[test]
    fn allowlist_check_is_exact() {
        let p = AgentProfile::new("a", "").with_agents(["research_agent"]);
        assert!(p.allows_agent("research_agent"));
        assert!(!p.allows_agent("research"));
    }

    #[test]
    fn default_cap_applies() {
        let p = AgentProfile::new("a", "");
        assert_eq!(p.max_iterations, DEFAULT_MAX_ITERATIONS);
    }
}
