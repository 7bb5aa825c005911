//! SQLite persistence backend.
//!
//! Two tables back the gateway contract:
//! - `agent_memories` — memory entries keyed by (chat_id, agent)
//! - `chat_messages` — the user/assistant transcript keyed by chat_id
//!
//! WAL journaling keeps concurrent session flushes from blocking reads.

use std::str::FromStr;

use async_trait::async_trait;
use brandloom_core::error::MemoryError;
use brandloom_core::memory::{ChatMessage, ChatRole, MemoryEntry, PersistenceGateway};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

/// Durable SQLite-backed `PersistenceGateway`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agent_memories (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id    TEXT NOT NULL,
                agent      TEXT NOT NULL,
                content    TEXT NOT NULL,
                metadata   TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("agent_memories table: {e}")))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_agent_memories_key
            ON agent_memories(chat_id, agent, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("agent_memories index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_messages (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id    TEXT NOT NULL,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                agent      TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("chat_messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_chat_messages_chat
            ON chat_messages(chat_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("chat_messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryEntry, MemoryError> {
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let metadata_json: String = row
            .try_get("metadata")
            .map_err(|e| MemoryError::QueryFailed(format!("metadata column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(MemoryEntry {
            content,
            timestamp,
            metadata,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, MemoryError> {
        let chat_id: String = row
            .try_get("chat_id")
            .map_err(|e| MemoryError::QueryFailed(format!("chat_id column: {e}")))?;
        let role_str: String = row
            .try_get("role")
            .map_err(|e| MemoryError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
        let agent: Option<String> = row
            .try_get("agent")
            .map_err(|e| MemoryError::QueryFailed(format!("agent column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

        let role = match role_str.as_str() {
            "assistant" => ChatRole::Assistant,
            _ => ChatRole::User,
        };
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(ChatMessage {
            chat_id,
            role,
            content,
            agent,
            timestamp,
        })
    }
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn append_agent_memory(
        &self,
        chat_id: &str,
        agent: &str,
        entry: &MemoryEntry,
    ) -> Result<(), MemoryError> {
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|e| MemoryError::Storage(format!("Metadata serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO agent_memories (chat_id, agent, content, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(chat_id)
        .bind(agent)
        .bind(&entry.content)
        .bind(&metadata_json)
        .bind(entry.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT agent_memories failed: {e}")))?;

        Ok(())
    }

    async fn load_agent_memories(
        &self,
        chat_id: &str,
        agent: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT content, metadata, created_at FROM agent_memories
            WHERE chat_id = ?1 AND agent = ?2
            ORDER BY created_at DESC, iid DESC
            LIMIT ?3
            "#,
        )
        .bind(chat_id)
        .bind(agent)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("SELECT agent_memories failed: {e}")))?;

        let mut entries: Vec<MemoryEntry> = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<_, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    async fn save_chat_message(&self, message: &ChatMessage) -> Result<(), MemoryError> {
        let role = match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };

        sqlx::query(
            r#"
            INSERT INTO chat_messages (chat_id, role, content, agent, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&message.chat_id)
        .bind(role)
        .bind(&message.content)
        .bind(&message.agent)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("INSERT chat_messages failed: {e}")))?;

        Ok(())
    }

    async fn get_chat_messages(
        &self,
        chat_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT chat_id, role, content, agent, created_at FROM chat_messages
            WHERE chat_id = ?1
            ORDER BY created_at DESC, iid DESC
            LIMIT ?2
            "#,
        )
        .bind(chat_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("SELECT chat_messages failed: {e}")))?;

        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<_, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::new(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn memory_round_trip_preserves_metadata() {
        let s = store().await;
        let entry = MemoryEntry::new("observed something").with_metadata("phase", "dispatch");
        s.append_agent_memory("c1", "orchestrator", &entry)
            .await
            .unwrap();

        let loaded = s
            .load_agent_memories("c1", "orchestrator", 10)
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, "observed something");
        assert_eq!(loaded[0].metadata["phase"], "dispatch");
    }

    #[tokio::test]
    async fn memories_come_back_chronological() {
        let s = store().await;
        for i in 0..3 {
            let mut e = MemoryEntry::new(format!("e{i}"));
            e.timestamp = Utc::now() + chrono::Duration::seconds(i);
            s.append_agent_memory("c1", "a", &e).await.unwrap();
        }
        let loaded = s.load_agent_memories("c1", "a", 10).await.unwrap();
        assert_eq!(loaded[0].content, "e0");
        assert_eq!(loaded[2].content, "e2");
    }

    #[tokio::test]
    async fn memory_load_limit_keeps_most_recent() {
        let s = store().await;
        for i in 0..4 {
            let mut e = MemoryEntry::new(format!("e{i}"));
            e.timestamp = Utc::now() + chrono::Duration::seconds(i);
            s.append_agent_memory("c1", "a", &e).await.unwrap();
        }
        let loaded = s.load_agent_memories("c1", "a", 2).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "e2");
        assert_eq!(loaded[1].content, "e3");
    }

    #[tokio::test]
    async fn control_tag_survives_round_trip() {
        let s = store().await;
        let entry = MemoryEntry::control("{\"chat_id\":\"c1\"}");
        s.append_agent_memory("c1", "a", &entry).await.unwrap();
        let loaded = s.load_agent_memories("c1", "a", 10).await.unwrap();
        assert!(loaded[0].is_control());
    }

    #[tokio::test]
    async fn chat_messages_limit_returns_most_recent() {
        let s = store().await;
        for i in 0..4 {
            let mut m = ChatMessage::new("c1", ChatRole::User, format!("m{i}"));
            m.timestamp = Utc::now() + chrono::Duration::seconds(i);
            s.save_chat_message(&m).await.unwrap();
        }
        let recent = s.get_chat_messages("c1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m2");
        assert_eq!(recent[1].content, "m3");
    }

    #[tokio::test]
    async fn agent_attribution_round_trips() {
        let s = store().await;
        let m = ChatMessage::new("c1", ChatRole::Assistant, "done").from_agent("orchestrator");
        s.save_chat_message(&m).await.unwrap();
        let msgs = s.get_chat_messages("c1", 10).await.unwrap();
        assert_eq!(msgs[0].agent.as_deref(), Some("orchestrator"));
    }

    #[tokio::test]
    async fn unknown_chat_is_empty() {
        let s = store().await;
        assert!(
            s.load_agent_memories("nope", "a", 10)
                .await
                .unwrap()
                .is_empty()
        );
        assert!(s.get_chat_messages("nope", 10).await.unwrap().is_empty());
    }
}
