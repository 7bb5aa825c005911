//! System prompt construction.
//!
//! The prompt advertises the agent's role, its delegation targets, its tools
//! with parameter schemas, and the strict JSON output contract the decision
//! parser expects.

use brandloom_core::{AgentProfile, DispatchResult, ToolRegistry};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Builds the system prompt for one loop run.
pub trait PromptBuilder: Send + Sync {
    fn build(&self, profile: &AgentProfile, peers: &HashMap<String, AgentProfile>) -> String;
}

/// Default prompt builder driven by the agent roster and tool registry.
///
/// The opening role line comes from an optional prompt file (a JSON object
/// mapping agent name to role text); agents without an entry get a line
/// built from their profile description.
pub struct RegistryPromptBuilder {
    tools: Arc<ToolRegistry>,
    role_prompts: HashMap<String, String>,
}

impl RegistryPromptBuilder {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self {
            tools,
            role_prompts: HashMap::new(),
        }
    }

    /// Load role prompts from `path`. A missing file means built-ins for
    /// every agent; an unreadable one is logged and treated the same.
    pub fn from_file(tools: Arc<ToolRegistry>, path: &Path) -> Self {
        let role_prompts = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => {
                    debug!(path = %path.display(), count = map.len(), "Loaded role prompts");
                    map
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid role prompt file, using built-ins");
                    HashMap::new()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "No role prompt file, using built-ins");
                HashMap::new()
            }
        };
        Self {
            tools,
            role_prompts,
        }
    }
}

impl PromptBuilder for RegistryPromptBuilder {
    fn build(&self, profile: &AgentProfile, peers: &HashMap<String, AgentProfile>) -> String {
        let mut prompt = match self.role_prompts.get(&profile.name) {
            Some(role) => format!("{role}\n"),
            None => format!(
                "You are {}. {}.\n",
                profile.name.to_uppercase(),
                profile.description
            ),
        };

        if !profile.allowed_agents.is_empty() {
            prompt.push_str("\nRegistered agents you may delegate to:\n");
            let mut names: Vec<&String> = profile.allowed_agents.iter().collect();
            names.sort();
            for name in names {
                let description = peers
                    .get(name.as_str())
                    .map(|p| p.description.as_str())
                    .unwrap_or("");
                prompt.push_str(&format!("- {name}: {description}\n"));
            }
        }

        if !profile.allowed_tools.is_empty() {
            prompt.push_str("\nTools available to you:\n");
            for (name, description, schema) in self.tools.descriptors() {
                if !profile.allows_tool(&name) {
                    continue;
                }
                prompt.push_str(&format!("- {name}: {description}\n"));
                if let Ok(schema_str) = serde_json::to_string(&schema) {
                    if schema_str != "{}" {
                        prompt.push_str(&format!("  parameters: {schema_str}\n"));
                    }
                }
            }
        }

        prompt.push_str(
            "\nOutput RULE: Return a STRICT JSON object only (no extra text) with this schema:\n\
             {\n\
             \x20 \"text\": \"final response, or empty if an action is required\",\n\
             \x20 \"tool_required\": boolean,\n\
             \x20 \"tool_name\": \"string (only if tool_required is true)\",\n\
             \x20 \"input_schema_fields\": { \"field\": \"value\" },\n\
             \x20 \"agent_required\": boolean,\n\
             \x20 \"agent_name\": \"string (only if agent_required is true)\",\n\
             \x20 \"agent_query\": \"string (only if agent_required is true)\"\n\
             }\n\
             \nRules:\n\
             1) Exactly one of tool_required/agent_required may be true.\n\
             2) Solve the task in the fewest steps possible. If you can answer \
             directly, set both flags false and put the answer in text.\n\
             3) Keep agent_query concise and include required context in square \
             brackets (e.g. [path:/tmp/image.png]).\n\
             4) Output ONLY the JSON object described above, nothing else.\n",
        );

        prompt
    }
}

/// The follow-up user turn after a dispatch, feeding the result back so the
/// model can replan or finish.
pub fn follow_up_prompt(
    original_query: &str,
    target_kind: &str,
    target_name: &str,
    result: &DispatchResult,
) -> String {
    format!(
        "Original user message: {original_query}\n\n\
         {} used: {target_name}\n\
         {} result: {}\n\n\
         Continue executing the plan. If more work is required, set the \
         appropriate flag with the next target and a concise query. If \
         finished, set both flags false and provide the final text.",
        capitalize(target_kind),
        capitalize(target_kind),
        result.render(),
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandloom_core::stock_profiles;
    use serde_json::json;
    use std::io::Write;

    fn peers() -> HashMap<String, AgentProfile> {
        stock_profiles()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect()
    }

    #[test]
    fn prompt_names_allowed_agents_with_descriptions() {
        let builder = RegistryPromptBuilder::new(Arc::new(ToolRegistry::new()));
        let peers = peers();
        let orchestrator = peers["orchestrator"].clone();
        let prompt = builder.build(&orchestrator, &peers);

        assert!(prompt.contains("ORCHESTRATOR"));
        assert!(prompt.contains("research_agent:"));
        assert!(prompt.contains("grounded searches"));
    }

    #[test]
    fn prompt_includes_json_contract() {
        let builder = RegistryPromptBuilder::new(Arc::new(ToolRegistry::new()));
        let peers = peers();
        let prompt = builder.build(&peers["copy_writer"], &peers);
        assert!(prompt.contains("tool_required"));
        assert!(prompt.contains("agent_required"));
        assert!(prompt.contains("STRICT JSON"));
    }

    #[test]
    fn role_prompt_file_overrides_builtin_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"orchestrator": "You are the routing brain of the studio."}}"#
        )
        .unwrap();

        let builder =
            RegistryPromptBuilder::from_file(Arc::new(ToolRegistry::new()), file.path());
        let peers = peers();
        let prompt = builder.build(&peers["orchestrator"], &peers);
        assert!(prompt.starts_with("You are the routing brain of the studio."));

        // Agents without an entry keep the built-in line
        let prompt = builder.build(&peers["copy_writer"], &peers);
        assert!(prompt.contains("COPY_WRITER"));
    }

    #[test]
    fn missing_role_prompt_file_falls_back() {
        let builder = RegistryPromptBuilder::from_file(
            Arc::new(ToolRegistry::new()),
            Path::new("/nonexistent/system_prompts.json"),
        );
        let peers = peers();
        let prompt = builder.build(&peers["orchestrator"], &peers);
        assert!(prompt.contains("ORCHESTRATOR"));
    }

    #[test]
    fn follow_up_embeds_result_json() {
        let result = DispatchResult::success(json!({"hits": 2}));
        let prompt = follow_up_prompt("find stuff", "tool", "unified_search", &result);
        assert!(prompt.contains("Original user message: find stuff"));
        assert!(prompt.contains("Tool used: unified_search"));
        assert!(prompt.contains("\"hits\":2"));
    }
}
