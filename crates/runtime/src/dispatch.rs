//! Tool and agent dispatchers.
//!
//! Both sides of a decision's action resolve through the same
//! [`Dispatcher`] contract: name plus JSON params in, [`DispatchResult`]
//! out. Failures of any kind (unknown target, downstream error, deadline)
//! come back as failed results, never as panics or transport errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brandloom_core::error::DispatchError;
use brandloom_core::{DispatchResult, Dispatcher, ToolRegistry};
use brandloom_session::SessionContext;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::runner::AgentRuntime;

/// Resolves tool invocations against the registry, bounded by a deadline.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }
}

#[async_trait]
impl Dispatcher for ToolDispatcher {
    async fn invoke(&self, name: &str, params: Value) -> DispatchResult {
        let Some(tool) = self.registry.get(name) else {
            return DispatchError::UnknownTarget(name.to_string()).into();
        };

        debug!(tool = name, "Dispatching tool");
        let outcome = tokio::time::timeout(self.timeout, tool.execute(params)).await;

        match outcome {
            Err(_) => {
                warn!(tool = name, "Tool dispatch deadline exceeded");
                DispatchError::Timeout {
                    target: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
                .into()
            }
            Ok(Err(e)) => DispatchResult::failure(e.to_string()),
            Ok(Ok(payload)) => {
                // A structurally valid payload carrying success=false is a
                // failure, same as a thrown error.
                if payload.get("success").and_then(Value::as_bool) == Some(false) {
                    let reason = payload
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("tool reported failure")
                        .to_string();
                    DispatchResult::failure(reason)
                } else {
                    DispatchResult::success(payload)
                }
            }
        }
    }

    fn targets(&self) -> Vec<String> {
        self.registry.names()
    }
}

/// Resolves agent delegations by running the named agent's loop within the
/// same session. Params carry the delegated query as `{"query": "..."}`.
pub struct AgentDispatcher {
    runtime: Arc<AgentRuntime>,
    session: Arc<SessionContext>,
    timeout: Duration,
}

impl AgentDispatcher {
    pub fn new(runtime: Arc<AgentRuntime>, session: Arc<SessionContext>, timeout: Duration) -> Self {
        Self {
            runtime,
            session,
            timeout,
        }
    }
}

#[async_trait]
impl Dispatcher for AgentDispatcher {
    async fn invoke(&self, name: &str, params: Value) -> DispatchResult {
        if !self.runtime.has_agent(name) {
            return DispatchError::UnknownTarget(name.to_string()).into();
        }

        let query = params
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        debug!(agent = name, "Dispatching nested agent");
        let runtime = self.runtime.clone();
        let session = self.session.clone();
        let run = Box::pin(async move { runtime.run(name, &session, &query).await });

        match tokio::time::timeout(self.timeout, run).await {
            Err(_) => {
                warn!(agent = name, "Agent dispatch deadline exceeded");
                DispatchError::Timeout {
                    target: name.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                }
                .into()
            }
            Ok(Err(e)) => DispatchResult::failure(e.to_string()),
            Ok(Ok(reply)) if reply.error => DispatchResult::failure(reply.text),
            Ok(Ok(reply)) => DispatchResult::success(json!({ "text": reply.text })),
        }
    }

    fn targets(&self) -> Vec<String> {
        self.runtime.agent_names()
    }
}
