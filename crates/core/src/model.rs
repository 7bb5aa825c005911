//! Chat model abstraction.
//!
//! The runtime only ever needs "prompt in, text out". Structure is imposed
//! afterwards by [`crate::decision::Decision::from_model_output`], so the
//! trait stays provider-agnostic.

use async_trait::async_trait;

use crate::error::ModelError;

/// A request to the model: a system prompt and the user-turn content.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// A provider-backed chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, for logging.
    fn id(&self) -> &str;

    /// Run one completion and return the raw text output.
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError>;
}
