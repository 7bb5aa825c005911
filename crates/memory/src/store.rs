//! Bounded per-agent memory ring.

use std::collections::VecDeque;

use brandloom_core::MemoryEntry;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Append-only bounded memory for one agent within one session.
///
/// Backed by a ring: once `capacity` entries are held, appending evicts the
/// oldest. All access goes through an async lock so concurrent readers and
/// the single writer per agent never observe a torn state.
pub struct AgentMemory {
    entries: Mutex<VecDeque<MemoryEntry>>,
    capacity: usize,
}

/// Rough token estimate used for context budgeting.
fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f32 * 1.3).ceil() as usize
}

impl AgentMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(256))),
            capacity,
        }
    }

    /// Append one entry, evicting the oldest when the ring is full.
    pub async fn append(&self, entry: MemoryEntry) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The `n` most recent entries, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<MemoryEntry> {
        let entries = self.entries.lock().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Entries strictly newer than `cursor` that belong in durable storage.
    ///
    /// Control frames are included (they are tagged, storage filters them on
    /// read); entries synthesized from chat history are not, so hydrated
    /// history is never written back.
    pub async fn unpersisted_since(&self, cursor: Option<DateTime<Utc>>) -> Vec<MemoryEntry> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| cursor.is_none_or(|c| e.timestamp > c))
            .filter(|e| !e.is_chat_sourced())
            .cloned()
            .collect()
    }

    /// Render recent memory as prompt context, newest entries preferred.
    ///
    /// Walks backwards from the newest entry accumulating an estimated token
    /// cost until `token_budget` is reached, then emits the selected entries
    /// in chronological order as `[HH:MM] content` lines. Control frames are
    /// never rendered.
    pub async fn render_context(&self, token_budget: usize) -> String {
        let entries = self.entries.lock().await;
        let mut selected: Vec<&MemoryEntry> = Vec::new();
        let mut used = 0usize;

        for entry in entries.iter().rev() {
            if entry.is_control() {
                continue;
            }
            let cost = estimate_tokens(&entry.content);
            if used + cost > token_budget && !selected.is_empty() {
                break;
            }
            used += cost;
            selected.push(entry);
        }

        selected
            .iter()
            .rev()
            .map(|e| format!("[{}] {}", e.timestamp.format("%H:%M"), e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Replace the full contents, truncating to capacity (newest kept).
    /// Used by hydration.
    pub async fn replace_all(&self, mut new_entries: Vec<MemoryEntry>) {
        if new_entries.len() > self.capacity {
            new_entries.drain(..new_entries.len() - self.capacity);
        }
        let mut entries = self.entries.lock().await;
        entries.clear();
        entries.extend(new_entries);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Full copy of the current contents, oldest first.
    pub async fn snapshot(&self) -> Vec<MemoryEntry> {
        self.entries.lock().await.iter().cloned().collect()
    }
}
