//! Shared mocks for runtime tests.

use async_trait::async_trait;
use brandloom_core::error::{DispatchError, MemoryError, ModelError};
use brandloom_core::memory::{ChatMessage, MemoryEntry, PersistenceGateway};
use brandloom_core::{ChatModel, ModelRequest, Tool};
use serde_json::Value;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A model that replays scripted responses in order.
///
/// Panics when the script is exhausted, which makes an unexpected extra
/// model call a loud test failure.
pub struct ScriptedModel {
    responses: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(responses: Vec<String>) -> Self {
        let mut reversed = responses;
        reversed.reverse();
        Self {
            responses: Mutex::new(reversed),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| panic!("ScriptedModel exhausted after {} calls", self.call_count()));
        Ok(response)
    }
}

pub struct FailingModel;

#[async_trait]
impl ChatModel for FailingModel {
    fn id(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ModelRequest) -> Result<String, ModelError> {
        Err(ModelError::Network("connection refused".into()))
    }
}

/// A tool that counts invocations and returns a fixed payload, or fails
/// until a required parameter appears.
pub struct CountingTool {
    name: String,
    required_param: Option<String>,
    pub calls: AtomicUsize,
}

impl CountingTool {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_param: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails any call whose params lack `param`.
    pub fn requiring(name: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_param: Some(param.into()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "test tool"
    }

    async fn execute(&self, params: Value) -> Result<Value, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(required) = &self.required_param {
            if params.get(required).is_none() {
                return Err(DispatchError::InvalidParams(format!(
                    "missing field: {required}"
                )));
            }
        }
        Ok(serde_json::json!({"status": "done", "params": params}))
    }
}

/// A persistence gateway whose writes always fail. Reads succeed empty.
pub struct BrokenStore;

#[async_trait]
impl PersistenceGateway for BrokenStore {
    async fn append_agent_memory(
        &self,
        _chat_id: &str,
        _agent: &str,
        _entry: &MemoryEntry,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::Storage("disk full".into()))
    }

    async fn load_agent_memories(
        &self,
        _chat_id: &str,
        _agent: &str,
        _limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        Ok(vec![])
    }

    async fn save_chat_message(&self, _message: &ChatMessage) -> Result<(), MemoryError> {
        Err(MemoryError::Storage("disk full".into()))
    }

    async fn get_chat_messages(
        &self,
        _chat_id: &str,
        _limit: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        Ok(vec![])
    }
}
