//! Session registry.

use std::collections::HashMap;
use std::sync::Arc;

use brandloom_core::error::Result;
use brandloom_core::memory::PersistenceGateway;
use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tracing::info;

use crate::context::SessionContext;

/// Owns every live [`SessionContext`].
///
/// Constructed once at startup and handed to the gateway; there is no global
/// instance. Safe for concurrent create/get/remove from many connections.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionContext>>>,
    store: Arc<dyn PersistenceGateway>,
    agent_names: Vec<String>,
    capacity: usize,
    chat_history_limit: usize,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        agent_names: Vec<String>,
        capacity: usize,
        chat_history_limit: usize,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            agent_names,
            capacity,
            chat_history_limit,
        }
    }

    /// Create and register a session. If `chat_id` is given the session is
    /// bound and hydrated before it is returned.
    pub async fn create(
        &self,
        user_id: Option<String>,
        chat_id: Option<&str>,
    ) -> Result<Arc<SessionContext>> {
        let ctx = Arc::new(SessionContext::new(
            user_id,
            &self.agent_names,
            self.store.clone(),
            self.capacity,
            self.chat_history_limit,
        ));

        if let Some(chat_id) = chat_id {
            ctx.bind_chat(chat_id).await?;
        }

        let session_id = ctx.session_id().to_string();
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), ctx.clone());
        info!(session_id, "Session created");
        Ok(ctx)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Remove a session, returning it so the caller can flush before drop.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        let removed = self.sessions.lock().await.remove(session_id);
        if removed.is_some() {
            info!(session_id, "Session removed");
        }
        removed
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Flush and drop sessions idle for longer than `max_age_hours`.
    /// Returns how many were removed.
    pub async fn cleanup_inactive(&self, max_age_hours: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let stale: Vec<Arc<SessionContext>> = {
            let sessions = self.sessions.lock().await;
            let mut stale = Vec::new();
            for ctx in sessions.values() {
                if ctx.last_active().await < cutoff {
                    stale.push(ctx.clone());
                }
            }
            stale
        };

        for ctx in &stale {
            ctx.flush().await?;
            self.sessions.lock().await.remove(ctx.session_id());
        }

        if !stale.is_empty() {
            info!(count = stale.len(), "Cleaned up inactive sessions");
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brandloom_memory::InMemoryStore;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(InMemoryStore::new()),
            vec!["orchestrator".into()],
            200,
            50,
        )
    }

    #[tokio::test]
    async fn create_get_remove_round_trip() {
        let reg = registry();
        let ctx = reg.create(Some("u1".into()), None).await.unwrap();
        let id = ctx.session_id().to_string();

        assert!(reg.get(&id).await.is_some());
        assert_eq!(reg.len().await, 1);

        let removed = reg.remove(&id).await.unwrap();
        assert_eq!(removed.session_id(), id);
        assert!(reg.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn create_with_chat_binds_immediately() {
        let reg = registry();
        let ctx = reg.create(None, Some("c1")).await.unwrap();
        assert_eq!(ctx.chat_id().await.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let reg = registry();
        let a = reg.create(None, None).await.unwrap();
        let b = reg.create(None, None).await.unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_eq!(reg.len().await, 2);
    }

    #[tokio::test]
    async fn remove_unknown_is_none() {
        let reg = registry();
        assert!(reg.remove("missing").await.is_none());
    }

    #[tokio::test]
    async fn cleanup_spares_recently_active_sessions() {
        let reg = registry();
        reg.create(None, None).await.unwrap();
        let removed = reg.cleanup_inactive(1).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(reg.len().await, 1);
    }
}
