//! In-process persistence backend, used in tests and ephemeral deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use brandloom_core::error::MemoryError;
use brandloom_core::memory::{ChatMessage, MemoryEntry, PersistenceGateway};
use tokio::sync::RwLock;

/// A `PersistenceGateway` holding everything in process memory.
///
/// Ordering mirrors the durable backends: entries come back oldest first.
#[derive(Default)]
pub struct InMemoryStore {
    memories: RwLock<HashMap<(String, String), Vec<MemoryEntry>>>,
    messages: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total memory entries across all keys, for test assertions.
    pub async fn memory_count(&self) -> usize {
        self.memories.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryStore {
    async fn append_agent_memory(
        &self,
        chat_id: &str,
        agent: &str,
        entry: &MemoryEntry,
    ) -> Result<(), MemoryError> {
        let mut memories = self.memories.write().await;
        memories
            .entry((chat_id.to_string(), agent.to_string()))
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn load_agent_memories(
        &self,
        chat_id: &str,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let memories = self.memories.read().await;
        let all = memories
            .get(&(chat_id.to_string(), agent.to_string()))
            .cloned()
            .unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_chat_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let messages = self.messages.read().await;
        let all = messages.get(chat_id).cloned().unwrap_or_default();
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandloom_core::memory::ChatRole;

    #[tokio::test]
    async fn memories_are_keyed_by_chat_and_agent() {
        let store = InMemoryStore::new();
        store
            .append_agent_memory("c1", "orchestrator", &MemoryEntry::new("a"))
            .await
            .unwrap();
        store
            .append_agent_memory("c1", "research_agent", &MemoryEntry::new("b"))
            .await
            .unwrap();

        let orch = store
            .load_agent_memories("c1", "orchestrator", 10)
            .await
            .unwrap();
        assert_eq!(orch.len(), 1);
        assert_eq!(orch[0].content, "a");

        let other_chat = store
            .load_agent_memories("c2", "orchestrator", 10)
            .await
            .unwrap();
        assert!(other_chat.is_empty());
    }

    #[tokio::test]
    async fn memory_load_limit_keeps_most_recent() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            store
                .append_agent_memory("c1", "a", &MemoryEntry::new(format!("e{i}")))
                .await
                .unwrap();
        }
        let loaded = store.load_agent_memories("c1", "a", 2).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "e2");
        assert_eq!(loaded[1].content, "e3");
    }

    #[tokio::test]
    async fn chat_messages_respect_limit_and_order() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .save_chat_message(&ChatMessage::new("c1", ChatRole::User, format!("m{i}")))
                .await
                .unwrap();
        }
        let recent = store.get_chat_messages("c1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
    }
}
