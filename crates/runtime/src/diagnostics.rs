//! Failure diagnostics.
//!
//! When a dispatch fails, the runtime can ask a diagnostics gateway for a
//! structured diagnosis before surfacing the error. The gateway is itself
//! model-backed but total: if analysis fails, it degrades to a diagnosis
//! that recommends raising the error to the user.

use async_trait::async_trait;
use brandloom_core::{ChatModel, ModelRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the runtime knows about a failed dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    /// Agent whose loop observed the failure.
    pub agent: String,
    /// "tool" or "agent".
    pub target_kind: String,
    /// The tool or agent that failed.
    pub target: String,
    /// Parameters or query sent to the target.
    pub payload: Value,
    /// The error as reported by the dispatcher.
    pub error: String,
    /// Agents the failing loop could route to instead.
    pub available_agents: Vec<String>,
    /// Tools the failing loop could fall back to.
    pub available_tools: Vec<String>,
}

/// Remediation action a diagnosis may propose, in the runtime's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionAction {
    AutoFixAndRetry,
    RetryWithPromptFix,
    CorrectInputSchema,
    RouteToAgent,
    FallbackTool,
    RequireUserInput,
    RaiseErrorToUser,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub action: SolutionAction,
    #[serde(default)]
    pub description: String,
    /// Exact replacement parameters or routing target, when applicable.
    #[serde(default)]
    pub patch: Option<Value>,
    #[serde(default)]
    pub priority: u8,
}

/// Structured output of one diagnosis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub safety_warnings: Vec<String>,
}

impl Diagnosis {
    /// Minimal diagnosis used when analysis itself fails.
    pub fn fallback(analysis: impl Into<String>) -> Self {
        Self {
            analysis: analysis.into(),
            issues: vec![],
            solutions: vec![Solution {
                action: SolutionAction::RaiseErrorToUser,
                description: "Diagnosis unavailable, surface the original error".into(),
                patch: None,
                priority: 1,
            }],
            next_steps: vec![],
            safety_warnings: vec![],
        }
    }

    /// The highest-priority solution proposing `action`, if any.
    pub fn solution_for(&self, action: SolutionAction) -> Option<&Solution> {
        self.solutions
            .iter()
            .filter(|s| s.action == action)
            .min_by_key(|s| s.priority)
    }

    /// The recommended action names, for user-facing error text.
    pub fn action_summary(&self) -> String {
        self.solutions
            .iter()
            .map(|s| {
                serde_json::to_value(s.action)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Diagnoses failed dispatches. Total by contract: never errors.
#[async_trait]
pub trait DiagnosticsGateway: Send + Sync {
    async fn diagnose(&self, report: FailureReport) -> Diagnosis;
}

/// Model-backed diagnostics.
pub struct ModelDiagnostics {
    model: Arc<dyn ChatModel>,
}

impl ModelDiagnostics {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    fn build_prompt(report: &FailureReport) -> String {
        let mut prompt = String::from(
            "You are a safety-first reviewer inspecting a failed agent/tool \
             execution. Use only the data provided; do not invent facts and do \
             not call external services. Prefer minimal, conservative changes \
             that fix the immediate failure.\n\n\
             AVAILABLE ACTIONS:\n\
             - auto_fix_and_retry (small parameter change you can propose)\n\
             - retry_with_prompt_fix (improve prompt/args)\n\
             - correct_input_schema (map/fix parameter names/types)\n\
             - route_to_agent (recommend a better agent and why)\n\
             - fallback_tool (recommend an alternate tool)\n\
             - require_user_input (ask the user for a missing field)\n\
             - raise_error_to_user (expose the issue with suggested wording)\n\
             - abort (do not retry; manual intervention required)\n\n\
             OUTPUT FORMAT (return valid JSON only):\n\
             {\n\
             \x20 \"analysis\": \"brief summary of what went wrong and why\",\n\
             \x20 \"issues\": [{\"type\": \"...\", \"description\": \"...\", \
             \"severity\": \"critical|high|medium|low\", \"confidence\": 0.0, \
             \"evidence\": \"...\"}],\n\
             \x20 \"solutions\": [{\"action\": \"one_of_the_available_actions\", \
             \"description\": \"...\", \"patch\": null, \"priority\": 1}],\n\
             \x20 \"next_steps\": [\"...\"],\n\
             \x20 \"safety_warnings\": [\"...\"]\n\
             }\n\n\
             INPUT DATA TO ANALYZE:\n",
        );

        prompt.push_str(&format!("\nAGENT: {}", report.agent));
        prompt.push_str(&format!(
            "\n{}_NAME: {}",
            report.target_kind.to_uppercase(),
            report.target
        ));
        prompt.push_str(&format!(
            "\nPAYLOAD: {}",
            serde_json::to_string(&report.payload).unwrap_or_default()
        ));
        prompt.push_str(&format!("\nERROR_DETAILS: {}", report.error));
        if !report.available_agents.is_empty() {
            prompt.push_str(&format!(
                "\nAVAILABLE_AGENTS: {}",
                serde_json::to_string(&report.available_agents).unwrap_or_default()
            ));
        }
        if !report.available_tools.is_empty() {
            prompt.push_str(&format!(
                "\nAVAILABLE_TOOLS: {}",
                serde_json::to_string(&report.available_tools).unwrap_or_default()
            ));
        }
        prompt.push_str("\n\nAnalyze the above data and reply in the specified JSON format.");
        prompt
    }
}

#[async_trait]
impl DiagnosticsGateway for ModelDiagnostics {
    async fn diagnose(&self, report: FailureReport) -> Diagnosis {
        let original_error = report.error.clone();
        let system = Self::build_prompt(&report);
        let request = ModelRequest::new(system, "Diagnose the failure.");

        let raw = match self.model.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Diagnostics model call failed");
                return Diagnosis::fallback(original_error);
            }
        };

        match serde_json::from_str::<Diagnosis>(raw.trim()) {
            Ok(diagnosis) => {
                debug!(
                    solutions = diagnosis.solutions.len(),
                    "Diagnosis produced"
                );
                diagnosis
            }
            Err(e) => {
                warn!(error = %e, "Diagnostics output was not valid JSON");
                Diagnosis::fallback(original_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedModel;
    use serde_json::json;

    fn report() -> FailureReport {
        FailureReport {
            agent: "social_media_manager".into(),
            target_kind: "tool".into(),
            target: "unified_search".into(),
            payload: json!({"query": "x"}),
            error: "upstream returned 500".into(),
            available_agents: vec!["research_agent".into()],
            available_tools: vec!["unified_search".into()],
        }
    }

    #[tokio::test]
    async fn valid_diagnosis_parses() {
        let model = Arc::new(ScriptedModel::new(vec![
            r#"{"analysis": "missing field", "solutions": [{"action": "auto_fix_and_retry", "patch": {"query": "fixed"}, "priority": 1}]}"#.into(),
        ]));
        let diag = ModelDiagnostics::new(model).diagnose(report()).await;
        assert_eq!(diag.analysis, "missing field");
        let fix = diag.solution_for(SolutionAction::AutoFixAndRetry).unwrap();
        assert_eq!(fix.patch.as_ref().unwrap()["query"], "fixed");
    }

    #[tokio::test]
    async fn prose_output_degrades_to_fallback() {
        let model = Arc::new(ScriptedModel::new(vec!["I cannot analyze this.".into()]));
        let diag = ModelDiagnostics::new(model).diagnose(report()).await;
        assert_eq!(diag.analysis, "upstream returned 500");
        assert!(diag.solution_for(SolutionAction::RaiseErrorToUser).is_some());
    }

    #[test]
    fn solution_for_picks_highest_priority() {
        let diag = Diagnosis {
            analysis: "a".into(),
            issues: vec![],
            solutions: vec![
                Solution {
                    action: SolutionAction::RouteToAgent,
                    description: "".into(),
                    patch: Some(json!({"agent_name": "b"})),
                    priority: 3,
                },
                Solution {
                    action: SolutionAction::RouteToAgent,
                    description: "".into(),
                    patch: Some(json!({"agent_name": "a"})),
                    priority: 1,
                },
            ],
            next_steps: vec![],
            safety_warnings: vec![],
        };
        let best = diag.solution_for(SolutionAction::RouteToAgent).unwrap();
        assert_eq!(best.patch.as_ref().unwrap()["agent_name"], "a");
    }

    #[test]
    fn action_summary_lists_wire_names() {
        let diag = Diagnosis::fallback("x");
        assert_eq!(diag.action_summary(), "raise_error_to_user");
    }
}
