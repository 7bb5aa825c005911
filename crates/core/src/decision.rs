//! Decision model — the parsed, validated output of one model invocation.
//!
//! The model replies with a JSON object signalling either a terminal answer,
//! a tool call, or a delegation to another agent:
//!
//! ```json
//! {
//!   "text": "final answer when terminal",
//!   "tool_required": false,
//!   "agent_required": false,
//!   "tool_name": "required iff tool_required",
//!   "input_schema_fields": { "...": "..." },
//!   "agent_name": "required iff agent_required",
//!   "agent_query": "required iff agent_required"
//! }
//! ```
//!
//! Validation happens once here, at the boundary. A model that returns prose
//! instead of JSON is a recoverable condition (wrapped into a terminal
//! decision); a decision that sets both action flags is not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Validation failures for a structurally JSON-shaped decision.
///
/// These are *invalid shapes*, not parse failures — a raw output that is not
/// JSON at all never produces one of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecisionError {
    #[error("both tool_required and agent_required are set")]
    BothActionsSet,

    #[error("tool_required is set but tool_name is missing")]
    MissingToolName,

    #[error("agent_required is set but agent_name or agent_query is missing")]
    MissingAgentFields,
}

/// Serde mirror of the wire shape. All fields optional with defaults so that
/// partial or sloppy model output still deserializes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDecision {
    #[serde(default)]
    pub text: Option<String>,

    /// Legacy alias for `text` that some prompts still elicit.
    #[serde(default)]
    pub self_response: Option<String>,

    #[serde(default)]
    pub tool_required: bool,

    #[serde(default)]
    pub agent_required: bool,

    #[serde(default)]
    pub tool_name: Option<String>,

    /// Tool parameters. Models emit either an object or a list of objects;
    /// the list form is merged left-to-right during validation.
    #[serde(default)]
    pub input_schema_fields: Option<Value>,

    #[serde(default)]
    pub agent_name: Option<String>,

    #[serde(default)]
    pub agent_query: Option<String>,
}

/// The single action a non-terminal decision names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionAction {
    /// Invoke a tool with JSON parameters.
    Tool { name: String, params: Value },

    /// Delegate a query to a nested agent.
    Agent { name: String, query: String },
}

impl DecisionAction {
    /// The tool or agent name this action targets.
    pub fn target(&self) -> &str {
        match self {
            Self::Tool { name, .. } => name,
            Self::Agent { name, .. } => name,
        }
    }

    /// Status-event kind for this action ("tool" or "agent").
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tool { .. } => "tool",
            Self::Agent { .. } => "agent",
        }
    }
}

/// A validated model decision.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Final user-visible text. Meaningful when the decision is terminal.
    pub text: String,

    /// The requested action, if any. `None` means terminal.
    pub action: Option<DecisionAction>,

    /// The original model output, kept for audit and fallback.
    pub raw: Value,
}

impl Decision {
    /// A terminal decision wrapping plain text.
    pub fn terminal(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: Value::String(text.clone()),
            text,
            action: None,
        }
    }

    /// Whether this decision ends the loop.
    pub fn is_terminal(&self) -> bool {
        self.action.is_none()
    }

    /// Normalize raw model output into a validated decision.
    ///
    /// - Valid JSON with exactly one action flag → parsed decision.
    /// - Prose or unparseable JSON → `Ok` terminal decision carrying the raw
    ///   text verbatim (a model that talks instead of emitting JSON is a
    ///   recoverable condition, not a failure).
    /// - Both flags set, or a flag without its companion fields →
    ///   `Err(DecisionError)` and the loop must short-circuit.
    pub fn from_model_output(output: &str) -> std::result::Result<Self, DecisionError> {
        let raw: Value = match serde_json::from_str(output.trim()) {
            Ok(v) => v,
            Err(_) => return Ok(Self::terminal(output)),
        };

        if !raw.is_object() {
            return Ok(Self::terminal(output));
        }

        let parsed: RawDecision = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(_) => return Ok(Self::terminal(output)),
        };

        if parsed.tool_required && parsed.agent_required {
            return Err(DecisionError::BothActionsSet);
        }

        let text = parsed
            .text
            .or(parsed.self_response)
            .filter(|t| !t.is_empty());

        let action = if parsed.tool_required {
            let name = parsed
                .tool_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .ok_or(DecisionError::MissingToolName)?;
            let params = merge_params(parsed.input_schema_fields);
            Some(DecisionAction::Tool { name, params })
        } else if parsed.agent_required {
            let name = parsed
                .agent_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .ok_or(DecisionError::MissingAgentFields)?;
            let query = parsed
                .agent_query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .ok_or(DecisionError::MissingAgentFields)?;
            Some(DecisionAction::Agent { name, query })
        } else {
            None
        };

        // A terminal JSON object without a text field still needs something
        // to show the user; fall back to the raw output.
        let text = match (text, &action) {
            (Some(t), _) => t,
            (None, Some(_)) => String::new(),
            (None, None) => output.to_string(),
        };

        Ok(Self { text, action, raw })
    }
}

/// Normalize `input_schema_fields` into a single JSON object.
///
/// Accepts an object as-is and merges a list of objects left-to-right, the
/// two shapes models actually produce.
fn merge_params(fields: Option<Value>) -> Value {
    match fields {
        Some(Value::Object(map)) => Value::Object(map),
        Some(Value::Array(items)) => {
            let mut merged = serde_json::Map::new();
            for item in items {
                if let Value::Object(map) = item {
                    merged.extend(map);
                }
            }
            Value::Object(merged)
        }
        _ => Value::Object(serde_json::Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prose_output_becomes_terminal() {
        let d = Decision::from_model_output("Here is my answer in plain prose.").unwrap();
        assert!(d.is_terminal());
        assert_eq!(d.text, "Here is my answer in plain prose.");
    }

    #[test]
    fn terminal_json_decision() {
        let d = Decision::from_model_output(
            r#"{"text": "All done", "tool_required": false, "agent_required": false}"#,
        )
        .unwrap();
        assert!(d.is_terminal());
        assert_eq!(d.text, "All done");
    }

    #[test]
    fn self_response_alias_accepted() {
        let d = Decision::from_model_output(r#"{"self_response": "direct reply"}"#).unwrap();
        assert!(d.is_terminal());
        assert_eq!(d.text, "direct reply");
    }

    #[test]
    fn tool_decision_parses() {
        let d = Decision::from_model_output(
            r#"{"tool_required": true, "tool_name": "unified_search", "input_schema_fields": {"query": "rust"}}"#,
        )
        .unwrap();
        match d.action {
            Some(DecisionAction::Tool { ref name, ref params }) => {
                assert_eq!(name, "unified_search");
                assert_eq!(params["query"], "rust");
            }
            _ => panic!("Expected tool action"),
        }
    }

    #[test]
    fn agent_decision_parses() {
        let d = Decision::from_model_output(
            r#"{"agent_required": true, "agent_name": "asset_agent", "agent_query": "find the logo"}"#,
        )
        .unwrap();
        match d.action {
            Some(DecisionAction::Agent { ref name, ref query }) => {
                assert_eq!(name, "asset_agent");
                assert_eq!(query, "find the logo");
            }
            _ => panic!("Expected agent action"),
        }
    }

    #[test]
    fn both_flags_rejected() {
        let err = Decision::from_model_output(
            r#"{"tool_required": true, "agent_required": true, "tool_name": "x", "agent_name": "y", "agent_query": "q"}"#,
        )
        .unwrap_err();
        assert_eq!(err, DecisionError::BothActionsSet);
    }

    #[test]
    fn tool_without_name_rejected() {
        let err = Decision::from_model_output(r#"{"tool_required": true}"#).unwrap_err();
        assert_eq!(err, DecisionError::MissingToolName);
    }

    #[test]
    fn agent_without_query_rejected() {
        let err =
            Decision::from_model_output(r#"{"agent_required": true, "agent_name": "asset_agent"}"#)
                .unwrap_err();
        assert_eq!(err, DecisionError::MissingAgentFields);
    }

    #[test]
    fn param_list_is_merged() {
        let d = Decision::from_model_output(
            r#"{"tool_required": true, "tool_name": "t", "input_schema_fields": [{"a": 1}, {"b": 2}]}"#,
        )
        .unwrap();
        match d.action {
            Some(DecisionAction::Tool { ref params, .. }) => {
                assert_eq!(params["a"], 1);
                assert_eq!(params["b"], 2);
            }
            _ => panic!("Expected tool action"),
        }
    }

    #[test]
    fn non_object_json_becomes_terminal() {
        let d = Decision::from_model_output(r#"[1, 2, 3]"#).unwrap();
        assert!(d.is_terminal());
    }

    #[test]
    fn raw_is_preserved_for_audit() {
        let d = Decision::from_model_output(
            r#"{"text": "ok", "tool_required": false, "extra_field": 42}"#,
        )
        .unwrap();
        assert_eq!(d.raw["extra_field"], json!(42));
    }
}
