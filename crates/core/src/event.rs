//! Live status events.
//!
//! Agents narrate their progress ("nano messages") to whatever transport is
//! attached to the session. Delivery is best effort by contract: a slow or
//! absent client must never stall or fail the execution loop, and status
//! events are never persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event pushed to the client over the live channel.
///
/// Serialized with an `event` discriminator so clients can switch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// A short progress note emitted mid-run by an agent.
    NanoMessage {
        agent: String,
        message: String,
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chat_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Sent once when a live connection is established.
    SessionStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Acknowledges a chat bind or switch.
    ChatSwitched {
        session_id: String,
        chat_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl StatusEvent {
    /// A nano message stamped with the current time.
    pub fn nano(
        agent: impl Into<String>,
        message: impl Into<String>,
        session_id: impl Into<String>,
        chat_id: Option<String>,
    ) -> Self {
        Self::NanoMessage {
            agent: agent.into(),
            message: message.into(),
            session_id: session_id.into(),
            chat_id,
            timestamp: Utc::now(),
        }
    }
}

/// Transport for status events.
///
/// Implementations must be non-blocking: drop the event rather than wait on
/// a congested client.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Deliver an event, best effort. Returns whether it was accepted.
    async fn emit(&self, event: StatusEvent) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nano_message_serializes_with_discriminator() {
        let ev = StatusEvent::nano("orchestrator", "Searching assets", "s1", Some("c1".into()));
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], "nano_message");
        assert_eq!(v["agent"], "orchestrator");
        assert_eq!(v["chat_id"], "c1");
    }

    #[test]
    fn chat_id_omitted_when_unbound() {
        let ev = StatusEvent::nano("orchestrator", "hi", "s1", None);
        let v = serde_json::to_value(&ev).unwrap();
        assert!(v.get("chat_id").is_none());
    }

    #[test]
    fn session_started_round_trips() {
        let ev = StatusEvent::SessionStarted {
            session_id: "s1".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: StatusEvent = serde_json::from_str(&json).unwrap();
        matches!(back, StatusEvent::SessionStarted { .. })
            .then_some(())
            .unwrap();
    }
}
