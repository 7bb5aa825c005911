//! Memory entries, chat messages, and the persistence gateway trait.
//!
//! Agent memory is an append-only sequence of timestamped entries. Entries
//! carry open metadata; two keys have fixed meaning runtime-wide:
//!
//! - `kind = "control"` marks protocol frames (chat binds and the like) that
//!   were written through the memory path. They are tagged at write time and
//!   excluded from hydration and context rendering.
//! - `source = "chat_message"` marks entries synthesized from persisted chat
//!   history during hydration. They are never written back to storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MemoryError;

/// Metadata key marking an entry's kind.
pub const META_KIND: &str = "kind";
/// Metadata value for control frames.
pub const KIND_CONTROL: &str = "control";
/// Metadata key naming where a synthetic entry came from.
pub const META_SOURCE: &str = "source";
/// Metadata value for entries folded in from chat history.
pub const SOURCE_CHAT_MESSAGE: &str = "chat_message";

/// One unit of agent memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl MemoryEntry {
    /// A plain entry stamped with the current time.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// A control frame, tagged so hydration can skip it without sniffing
    /// content.
    pub fn control(content: impl Into<String>) -> Self {
        Self::new(content).with_metadata(META_KIND, KIND_CONTROL)
    }

    /// A synthetic entry folded in from chat history. Excluded from
    /// persistence so history is never duplicated in storage.
    pub fn chat_sourced(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let mut entry = Self::new(content).with_metadata(META_SOURCE, SOURCE_CHAT_MESSAGE);
        entry.timestamp = timestamp;
        entry
    }

    pub fn is_control(&self) -> bool {
        self.metadata
            .get(META_KIND)
            .and_then(Value::as_str)
            .is_some_and(|k| k == KIND_CONTROL)
    }

    pub fn is_chat_sourced(&self) -> bool {
        self.metadata
            .get(META_SOURCE)
            .and_then(Value::as_str)
            .is_some_and(|s| s == SOURCE_CHAT_MESSAGE)
    }
}

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// A persisted chat transcript message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub chat_id: String,
    pub role: ChatRole,
    pub content: String,
    /// For assistant messages, the agent that produced the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(chat_id: impl Into<String>, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            role,
            content: content.into(),
            agent: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }
}

/// Durable storage behind sessions.
///
/// Memory is keyed by `(chat_id, agent)`; the transcript by `chat_id` alone.
/// Implementations must return entries in chronological order.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Append one memory entry for an agent within a chat.
    async fn append_agent_memory(
        &self,
        chat_id: &str,
        agent: &str,
        entry: &MemoryEntry,
    ) -> Result<(), MemoryError>;

    /// Load up to `limit` most recent memory entries for `(chat_id, agent)`,
    /// oldest first.
    async fn load_agent_memories(
        &self,
        chat_id: &str,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError>;

    /// Persist one chat transcript message.
    async fn save_chat_message(&self, message: &ChatMessage) -> Result<(), MemoryError>;

    /// Load up to `limit` most recent transcript messages, oldest first.
    async fn get_chat_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError>;
}
