//! Per-connection session state.

use std::collections::HashMap;
use std::sync::Arc;

use brandloom_core::error::Result;
use brandloom_core::memory::{ChatMessage, ChatRole, MemoryEntry, PersistenceGateway};
use brandloom_core::{StatusEvent, StatusSink};
use brandloom_memory::AgentMemory;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Agent that receives folded user history during hydration.
const ROUTING_AGENT: &str = "orchestrator";

/// Upper bound on transcript rows examined during hydration.
const HYDRATION_SCAN_LIMIT: usize = 1000;

/// One live session: per-agent memory, the bound chat, the attached status
/// sink, and persistence cursors.
///
/// The cursor map records, per agent, the timestamp of the newest entry known
/// to be durably written. Flush only persists entries past the cursor, which
/// makes it idempotent and keeps the steady state exactly-once.
pub struct SessionContext {
    session_id: String,
    user_id: Option<String>,
    created_at: DateTime<Utc>,
    last_active: RwLock<DateTime<Utc>>,
    chat_id: RwLock<Option<String>>,
    memories: RwLock<HashMap<String, Arc<AgentMemory>>>,
    cursors: Mutex<HashMap<String, DateTime<Utc>>>,
    sink: RwLock<Option<Arc<dyn StatusSink>>>,
    store: Arc<dyn PersistenceGateway>,
    capacity: usize,
    chat_history_limit: usize,
}

impl SessionContext {
    pub fn new(
        user_id: Option<String>,
        agent_names: &[String],
        store: Arc<dyn PersistenceGateway>,
        capacity: usize,
        chat_history_limit: usize,
    ) -> Self {
        let now = Utc::now();
        let memories = agent_names
            .iter()
            .map(|name| (name.clone(), Arc::new(AgentMemory::new(capacity))))
            .collect();

        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id,
            created_at: now,
            last_active: RwLock::new(now),
            chat_id: RwLock::new(None),
            memories: RwLock::new(memories),
            cursors: Mutex::new(HashMap::new()),
            sink: RwLock::new(None),
            store,
            capacity,
            chat_history_limit,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.read().await
    }

    pub async fn chat_id(&self) -> Option<String> {
        self.chat_id.read().await.clone()
    }

    /// Mark the session as recently used.
    pub async fn touch(&self) {
        *self.last_active.write().await = Utc::now();
    }

    /// Memory store for `agent`, created on first use.
    pub async fn agent_memory(&self, agent: &str) -> Arc<AgentMemory> {
        {
            let memories = self.memories.read().await;
            if let Some(mem) = memories.get(agent) {
                return mem.clone();
            }
        }
        let mut memories = self.memories.write().await;
        memories
            .entry(agent.to_string())
            .or_insert_with(|| Arc::new(AgentMemory::new(self.capacity)))
            .clone()
    }

    // ── Status streaming ──

    pub async fn attach_sink(&self, sink: Arc<dyn StatusSink>) {
        *self.sink.write().await = Some(sink);
    }

    pub async fn detach_sink(&self) {
        *self.sink.write().await = None;
    }

    /// Best-effort progress note to the attached sink.
    ///
    /// Never blocks, never fails, never persisted. A missing or congested
    /// sink drops the event.
    pub async fn send_nano(&self, agent: &str, message: &str) {
        let sink = self.sink.read().await.clone();
        let Some(sink) = sink else {
            debug!(agent, "No sink attached, dropping status event");
            return;
        };
        let event = StatusEvent::nano(
            agent,
            message,
            &self.session_id,
            self.chat_id().await,
        );
        if !sink.emit(event).await {
            debug!(agent, "Sink rejected status event, dropped");
        }
    }

    // ── Chat binding and hydration ──

    /// Bind this session to a chat, flushing any pending entries for the
    /// previously bound chat first, then hydrating from storage.
    ///
    /// Binding the already-bound chat is a no-op.
    pub async fn bind_chat(&self, chat_id: &str) -> Result<()> {
        {
            let current = self.chat_id.read().await;
            if current.as_deref() == Some(chat_id) {
                return Ok(());
            }
        }

        if self.chat_id().await.is_some() {
            self.flush().await?;
        }

        *self.chat_id.write().await = Some(chat_id.to_string());
        self.cursors.lock().await.clear();
        self.hydrate().await?;
        self.touch().await;
        info!(session_id = %self.session_id, chat_id, "Session bound to chat");
        Ok(())
    }

    /// Rebuild every agent's memory from storage for the bound chat.
    ///
    /// Full replace: stored entries (minus control frames) plus synthetic
    /// entries folded in from the chat transcript. Assistant replies go to
    /// the agent that produced them; recent user messages go to the routing
    /// agent so it has conversational context. Cursors advance to the newest
    /// stored entry so hydrated data is never re-persisted.
    pub async fn hydrate(&self) -> Result<()> {
        let Some(chat_id) = self.chat_id().await else {
            return Ok(());
        };

        let agent_names: Vec<String> = self.memories.read().await.keys().cloned().collect();
        let mut staged: HashMap<String, Vec<MemoryEntry>> = HashMap::new();

        for agent in &agent_names {
            let loaded = self
                .store
                .load_agent_memories(&chat_id, agent, self.capacity)
                .await?;
            if let Some(last) = loaded.last() {
                self.cursors
                    .lock()
                    .await
                    .insert(agent.clone(), last.timestamp);
            }
            let entries: Vec<MemoryEntry> =
                loaded.into_iter().filter(|e| !e.is_control()).collect();
            debug!(agent, count = entries.len(), "Hydrated stored memories");
            staged.insert(agent.clone(), entries);
        }

        let transcript = self
            .store
            .get_chat_messages(&chat_id, HYDRATION_SCAN_LIMIT)
            .await?;

        for msg in &transcript {
            if msg.role != ChatRole::Assistant {
                continue;
            }
            let Some(agent) = msg.agent.as_deref() else {
                continue;
            };
            if let Some(entries) = staged.get_mut(agent) {
                entries.push(MemoryEntry::chat_sourced(
                    format!("Assistant reply: {}", msg.content),
                    msg.timestamp,
                ));
            }
        }

        if let Some(entries) = staged.get_mut(ROUTING_AGENT) {
            let user_msgs: Vec<&ChatMessage> = transcript
                .iter()
                .filter(|m| m.role == ChatRole::User)
                .collect();
            let skip = user_msgs.len().saturating_sub(self.chat_history_limit);
            for msg in user_msgs.into_iter().skip(skip) {
                entries.push(MemoryEntry::chat_sourced(
                    format!("User said: {}", msg.content),
                    msg.timestamp,
                ));
            }
        }

        for (agent, mut entries) in staged {
            entries.sort_by_key(|e| e.timestamp);
            self.agent_memory(&agent).await.replace_all(entries).await;
        }

        info!(session_id = %self.session_id, chat_id, "Memory hydration complete");
        Ok(())
    }

    // ── Persistence ──

    /// Append to an agent's memory and, if a chat is bound, write through to
    /// storage immediately. Without a bound chat the entry stays in memory
    /// and is picked up by the next flush.
    ///
    /// A storage failure is logged, never surfaced: the entry survives in
    /// memory with its cursor unadvanced, so the next flush retries it.
    pub async fn append_and_persist(&self, agent: &str, entry: MemoryEntry) {
        let timestamp = entry.timestamp;
        self.agent_memory(agent).await.append(entry.clone()).await;
        self.touch().await;

        let Some(chat_id) = self.chat_id().await else {
            return;
        };

        // The cursors lock is held across the store write so a concurrent
        // flush cannot observe the entry as unpersisted mid-write.
        let mut cursors = self.cursors.lock().await;
        match self.store.append_agent_memory(&chat_id, agent, &entry).await {
            Ok(()) => {
                let cursor = cursors.entry(agent.to_string()).or_insert(timestamp);
                if timestamp > *cursor {
                    *cursor = timestamp;
                }
            }
            Err(e) => warn!(agent, error = %e, "Failed to persist memory entry"),
        }
    }

    /// Persist every entry newer than its agent's cursor.
    ///
    /// Entries synthesized from chat history are skipped so the transcript is
    /// never duplicated into memory storage. Idempotent: a second flush with
    /// no new entries writes nothing.
    pub async fn flush(&self) -> Result<()> {
        let Some(chat_id) = self.chat_id().await else {
            debug!(session_id = %self.session_id, "Flush skipped, no chat bound");
            return Ok(());
        };

        let agent_names: Vec<String> = self.memories.read().await.keys().cloned().collect();
        let mut flushed = 0usize;

        for agent in &agent_names {
            // Same critical section as append_and_persist: cursor reads and
            // advances stay coupled to the store writes they describe.
            let mut cursors = self.cursors.lock().await;
            let cursor = cursors.get(agent).copied();
            let pending = self
                .agent_memory(agent)
                .await
                .unpersisted_since(cursor)
                .await;
            if pending.is_empty() {
                continue;
            }

            for entry in &pending {
                self.store
                    .append_agent_memory(&chat_id, agent, entry)
                    .await?;
            }
            if let Some(last) = pending.last() {
                cursors.insert(agent.clone(), last.timestamp);
            }
            flushed += pending.len();
        }

        if flushed > 0 {
            info!(session_id = %self.session_id, chat_id, flushed, "Session flushed");
        }
        Ok(())
    }

    /// Persist a transcript message for the bound chat. No-op when no chat is
    /// bound; the transcript only exists per chat. Storage failures are
    /// logged, never surfaced.
    pub async fn save_chat_message(&self, role: ChatRole, content: &str, agent: Option<&str>) {
        let Some(chat_id) = self.chat_id().await else {
            debug!(session_id = %self.session_id, "No chat bound, transcript message dropped");
            return;
        };

        let mut message = ChatMessage::new(chat_id, role, content);
        if let Some(agent) = agent {
            message = message.from_agent(agent);
        }
        if let Err(e) = self.store.save_chat_message(&message).await {
            warn!(error = %e, "Failed to persist chat message");
        }
    }

    /// Recent transcript rendered for prompt context.
    pub async fn chat_history_context(&self) -> Result<String> {
        let Some(chat_id) = self.chat_id().await else {
            return Ok(String::new());
        };

        let messages = self
            .store
            .get_chat_messages(&chat_id, self.chat_history_limit)
            .await?;

        Ok(messages
            .iter()
            .map(|m| match m.role {
                ChatRole::User => format!("User: {}", m.content),
                ChatRole::Assistant => format!(
                    "Assistant ({}): {}",
                    m.agent.as_deref().unwrap_or("unknown"),
                    m.content
                ),
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
