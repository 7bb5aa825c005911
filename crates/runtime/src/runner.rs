//! The generic agent execution loop.
//!
//! One loop serves every agent. A run alternates between model calls and
//! dispatches until the model produces a terminal decision or the profile's
//! iteration budget runs out. Within a run, model calls and dispatches are
//! strictly sequential; the loop suspends only while awaiting the model or a
//! dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use brandloom_core::error::{DispatchError, Result};
use brandloom_core::memory::{ChatRole, MemoryEntry};
use brandloom_core::{
    AgentProfile, ChatModel, Decision, DecisionAction, DispatchResult, Dispatcher, ModelRequest,
    ToolRegistry,
};
use brandloom_session::SessionContext;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::diagnostics::{DiagnosticsGateway, FailureReport, SolutionAction};
use crate::dispatch::{AgentDispatcher, ToolDispatcher};
use crate::prompt::{PromptBuilder, follow_up_prompt};

/// Final outcome of one agent run.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub error: bool,
}

impl AgentReply {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: false,
        }
    }

    fn err(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            error: true,
        }
    }
}

/// Everything the loop needs that is not per-session: the model, the tool
/// registry, the agent roster, prompt construction, and diagnostics.
pub struct AgentRuntime {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    prompts: Arc<dyn PromptBuilder>,
    profiles: HashMap<String, AgentProfile>,
    diagnostics: Option<Arc<dyn DiagnosticsGateway>>,
    dispatch_timeout: Duration,
    context_token_budget: usize,
}

impl AgentRuntime {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: Arc<ToolRegistry>,
        prompts: Arc<dyn PromptBuilder>,
        profiles: Vec<AgentProfile>,
    ) -> Self {
        Self {
            model,
            tools,
            prompts,
            profiles: profiles.into_iter().map(|p| (p.name.clone(), p)).collect(),
            diagnostics: None,
            dispatch_timeout: Duration::from_secs(60),
            context_token_budget: 2000,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsGateway>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn with_context_token_budget(mut self, budget: usize) -> Self {
        self.context_token_budget = budget;
        self
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn profiles(&self) -> &HashMap<String, AgentProfile> {
        &self.profiles
    }

    /// Run `agent` against `query` within `session` until a terminal reply.
    pub async fn run(
        self: &Arc<Self>,
        agent: &str,
        session: &Arc<SessionContext>,
        query: &str,
    ) -> Result<AgentReply> {
        let profile = self
            .profiles
            .get(agent)
            .ok_or_else(|| DispatchError::UnknownTarget(agent.to_string()))?
            .clone();

        if query.trim().is_empty() {
            session.send_nano(agent, "Received empty message").await;
            return Ok(AgentReply::ok(""));
        }

        info!(agent, "Agent run started");
        session.touch().await;

        let system_prompt = self.build_system_prompt(session, &profile).await?;
        session
            .append_and_persist(
                agent,
                MemoryEntry::new(format!("User query: {query}"))
                    .with_metadata("phase", "query"),
            )
            .await;

        let tool_dispatcher = ToolDispatcher::new(self.tools.clone(), self.dispatch_timeout);
        let agent_dispatcher =
            AgentDispatcher::new(self.clone(), session.clone(), self.dispatch_timeout);

        let mut user_turn = query.to_string();
        let mut last_delegated_text = String::new();
        let mut iteration: u32 = 0;

        loop {
            session.send_nano(agent, "thinking…").await;
            let raw = match self
                .model
                .complete(ModelRequest::new(&system_prompt, &user_turn))
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    session.send_nano(agent, "Error calling model").await;
                    return Ok(AgentReply::err(format!("Error calling model: {e}")));
                }
            };

            let decision = match Decision::from_model_output(&raw) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(agent, error = %e, "Invalid decision from model");
                    session.send_nano(agent, "Invalid decision from model").await;
                    return Ok(AgentReply::err(format!("Invalid decision: {e}")));
                }
            };

            let Some(action) = decision.action else {
                return self
                    .finish(agent, session, decision.text, &last_delegated_text)
                    .await;
            };

            if iteration >= profile.max_iterations {
                warn!(agent, iterations = iteration, "Max iterations reached");
                session
                    .send_nano(agent, "Max iterations reached, returning last result")
                    .await;
                let fallback = if !decision.text.is_empty() {
                    decision.text
                } else if !last_delegated_text.is_empty() {
                    last_delegated_text
                } else {
                    "Max iterations reached.".to_string()
                };
                return self.finish(agent, session, fallback, "").await;
            }
            iteration += 1;

            let (kind, name, params, description) = match &action {
                DecisionAction::Tool { name, params } => {
                    if !profile.allows_tool(name) {
                        let msg = format!("Unknown tool requested: '{name}'.");
                        session.send_nano(agent, &msg).await;
                        return Ok(AgentReply::err(msg));
                    }
                    (
                        "tool",
                        name.clone(),
                        params.clone(),
                        format!("calling tool {name}"),
                    )
                }
                DecisionAction::Agent { name, query } => {
                    if !profile.allows_agent(name) {
                        let msg = format!("Unknown agent requested: '{name}'.");
                        session.send_nano(agent, &msg).await;
                        return Ok(AgentReply::err(msg));
                    }
                    (
                        "agent",
                        name.clone(),
                        json!({ "query": query }),
                        format!("routing to agent {name}"),
                    )
                }
            };

            session.send_nano(agent, &description).await;
            session
                .append_and_persist(
                    agent,
                    MemoryEntry::new(format!(
                        "Dispatch decision: {kind} {name} with {}",
                        serde_json::to_string(&params).unwrap_or_default()
                    ))
                    .with_metadata("phase", "dispatch")
                    .with_metadata("target", name.as_str()),
                )
                .await;

            let dispatcher: &dyn Dispatcher = match kind {
                "tool" => &tool_dispatcher,
                _ => &agent_dispatcher,
            };

            let result = self
                .dispatch_with_recovery(&profile, session, dispatcher, kind, &name, params)
                .await;

            let result = match result {
                Ok(result) => result,
                Err(terminal) => {
                    session
                        .send_nano(agent, &format!("{kind} {name} failed"))
                        .await;
                    return Ok(terminal);
                }
            };

            session
                .send_nano(agent, &format!("{kind} {name} finished"))
                .await;

            if kind == "agent" {
                let sub_text = result
                    .payload
                    .get("text")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default();
                if !sub_text.is_empty() {
                    last_delegated_text = sub_text.to_string();
                }
                // The nested run already persisted its own transcript message
                session
                    .append_and_persist(
                        agent,
                        MemoryEntry::new(format!(
                            "Agent {name} completed with response: {}",
                            truncate(sub_text, 200)
                        ))
                        .with_metadata("phase", "agent_completion"),
                    )
                    .await;
            } else {
                session
                    .append_and_persist(
                        agent,
                        MemoryEntry::new(format!("Tool {name} result: {}", result.render()))
                            .with_metadata("phase", "tool_result"),
                    )
                    .await;
            }

            session
                .send_nano(agent, &format!("Processing {kind} {name} result"))
                .await;
            user_turn = follow_up_prompt(query, kind, &name, &result);
        }
    }

    /// Assemble the system prompt: profile prompt plus rendered memory and
    /// recent conversation.
    async fn build_system_prompt(
        &self,
        session: &Arc<SessionContext>,
        profile: &AgentProfile,
    ) -> Result<String> {
        let mut prompt = self.prompts.build(profile, &self.profiles);

        let memory_context = session
            .agent_memory(&profile.name)
            .await
            .render_context(self.context_token_budget)
            .await;
        if !memory_context.is_empty() {
            prompt.push_str(&format!("\n\nRecent memory:\n{memory_context}"));
        }

        let chat_context = session.chat_history_context().await?;
        if !chat_context.is_empty() {
            prompt.push_str(&format!("\n\nRecent conversation:\n{chat_context}"));
        }

        Ok(prompt)
    }

    /// Record and emit a terminal reply.
    ///
    /// If the final text is byte-identical to the last delegated agent's text
    /// already surfaced to the user, the transcript write is suppressed so
    /// the same message is not sent twice.
    async fn finish(
        self: &Arc<Self>,
        agent: &str,
        session: &Arc<SessionContext>,
        text: String,
        last_delegated_text: &str,
    ) -> Result<AgentReply> {
        if !last_delegated_text.is_empty() && text.trim() == last_delegated_text.trim() {
            debug!(agent, "Suppressing duplicate final response");
            return Ok(AgentReply::ok(text));
        }

        session.send_nano(agent, "answer ready").await;
        session
            .append_and_persist(
                agent,
                MemoryEntry::new(format!("{agent} response: {text}"))
                    .with_metadata("phase", "final"),
            )
            .await;
        session
            .save_chat_message(ChatRole::Assistant, &text, Some(agent))
            .await;

        info!(agent, "Agent run finished");
        Ok(AgentReply::ok(text))
    }

    /// Dispatch once; on failure consult diagnostics for a single recovery
    /// attempt (patched retry for tools, re-route for agents). A second
    /// failure, or no applicable solution, becomes a terminal error reply.
    async fn dispatch_with_recovery(
        &self,
        profile: &AgentProfile,
        session: &Arc<SessionContext>,
        dispatcher: &dyn Dispatcher,
        kind: &str,
        name: &str,
        params: serde_json::Value,
    ) -> std::result::Result<DispatchResult, AgentReply> {
        let result = dispatcher.invoke(name, params.clone()).await;
        if result.ok {
            return Ok(result);
        }

        let error = result
            .error
            .clone()
            .unwrap_or_else(|| "dispatch failed".into());
        warn!(agent = %profile.name, target = name, error, "Dispatch failed");

        let Some(diagnostics) = &self.diagnostics else {
            return Err(AgentReply::err(format!(
                "Error dispatching {kind} {name}: {error}"
            )));
        };

        session
            .send_nano(&profile.name, &format!("Diagnosing {name} failure"))
            .await;
        let diagnosis = diagnostics
            .diagnose(FailureReport {
                agent: profile.name.clone(),
                target_kind: kind.to_string(),
                target: name.to_string(),
                payload: params.clone(),
                error: error.clone(),
                available_agents: profile.allowed_agents.clone(),
                available_tools: profile.allowed_tools.clone(),
            })
            .await;

        let retried = match kind {
            "tool" => self
                .retry_tool_with_patch(&diagnosis, dispatcher, name, params)
                .await,
            _ => self
                .reroute_agent(&diagnosis, profile, dispatcher, name)
                .await,
        };

        if let Some(result) = retried {
            if result.ok {
                session
                    .send_nano(&profile.name, &format!("{kind} {name} recovered after retry"))
                    .await;
                return Ok(result);
            }
        }

        let analysis = if diagnosis.analysis.is_empty() {
            error
        } else {
            diagnosis.analysis.clone()
        };
        Err(AgentReply::err(format!(
            "{} {name} failed: {analysis}. Recommended actions: {}",
            capitalize(kind),
            diagnosis.action_summary(),
        )))
    }

    /// One retry with the diagnosis patch merged into the original params.
    async fn retry_tool_with_patch(
        &self,
        diagnosis: &crate::diagnostics::Diagnosis,
        dispatcher: &dyn Dispatcher,
        name: &str,
        params: serde_json::Value,
    ) -> Option<DispatchResult> {
        let solution = diagnosis.solution_for(SolutionAction::AutoFixAndRetry)?;
        let patch = solution.patch.as_ref()?.as_object()?.clone();

        let mut patched = match params {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        patched.extend(patch);

        debug!(tool = name, "Retrying with patched parameters");
        Some(
            dispatcher
                .invoke(name, serde_json::Value::Object(patched))
                .await,
        )
    }

    /// One retry against the agent the diagnosis recommends, if it differs
    /// from the failed one and is on the allow-list.
    async fn reroute_agent(
        &self,
        diagnosis: &crate::diagnostics::Diagnosis,
        profile: &AgentProfile,
        dispatcher: &dyn Dispatcher,
        failed: &str,
    ) -> Option<DispatchResult> {
        let solution = diagnosis.solution_for(SolutionAction::RouteToAgent)?;
        let patch = solution.patch.as_ref()?;
        let recommended = patch.get("agent_name")?.as_str()?;
        if recommended == failed || !profile.allows_agent(recommended) {
            return None;
        }

        let query = patch
            .get("agent_query")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();
        debug!(from = failed, to = recommended, "Re-routing after diagnosis");
        Some(
            dispatcher
                .invoke(recommended, json!({ "query": query }))
                .await,
        )
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
