//! Tool trait and registry.
//!
//! Tools are the capability layer agents reach through. Each tool declares a
//! name and a JSON parameter schema so the prompt builder can advertise it to
//! the model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DispatchError;

/// A capability an agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as referenced in model decisions.
    fn name(&self) -> &str;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    /// JSON schema of the expected parameters.
    fn parameters_schema(&self) -> Value {
        Value::Object(serde_json::Map::new())
    }

    /// Execute the tool with JSON parameters.
    async fn execute(&self, params: Value) -> Result<Value, DispatchError>;
}

/// Name-keyed collection of tools.
///
/// Built once at startup and shared behind an `Arc`. Registration is not
/// concurrent, so no interior locking.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Later registrations with the same name win.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Sorted tool names, stable for prompt construction.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, description, schema) triples for prompt construction, sorted
    /// by name.
    pub fn descriptors(&self) -> Vec<(String, String, Value)> {
        let mut out: Vec<(String, String, Value)> = self
            .tools
            .values()
            .map(|t| {
                (
                    t.name().to_string(),
                    t.description().to_string(),
                    t.parameters_schema(),
                )
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
