//! Dispatch abstraction shared by tool and agent invocation.
//!
//! The execution loop never fails because a dispatch failed. Every outcome,
//! success or failure, is folded into a [`DispatchResult`] that is rendered
//! back into the agent's context so the model can react to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// The uniform outcome of invoking a tool or a nested agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Whether the invocation succeeded.
    pub ok: bool,

    /// Result payload on success, or a structured error description.
    pub payload: Value,

    /// Human-readable error when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    /// A successful dispatch carrying a payload.
    pub fn success(payload: Value) -> Self {
        Self {
            ok: true,
            payload,
            error: None,
        }
    }

    /// A failed dispatch. The error is carried both as text and as a JSON
    /// payload so it can be fed back into the model context verbatim.
    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            ok: false,
            payload: serde_json::json!({ "error": error }),
            error: Some(error),
        }
    }

    /// Render this result as a compact JSON string for prompt embedding.
    pub fn render(&self) -> String {
        serde_json::to_string(&self.payload).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<DispatchError> for DispatchResult {
    fn from(err: DispatchError) -> Self {
        Self::failure(err.to_string())
    }
}

/// A named invocation target resolver.
///
/// Implemented for tool registries and for the agent delegation path. The
/// contract is total: an unknown target or a downstream failure becomes a
/// failed [`DispatchResult`], never an `Err`.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Invoke `name` with JSON parameters.
    async fn invoke(&self, name: &str, params: Value) -> DispatchResult;

    /// Names this dispatcher can resolve, for prompt construction.
    fn targets(&self) -> Vec<String>;
}
