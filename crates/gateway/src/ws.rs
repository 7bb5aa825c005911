//! Per-connection WebSocket protocol.
//!
//! Inbound frames are JSON objects. A frame carrying `chat_id` (re)binds the
//! session's chat; a frame carrying `text` is a user message handed to the
//! orchestrator. Outbound traffic interleaves status events with terminal
//! replies on the same socket.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use brandloom_core::memory::{ChatRole, MemoryEntry};
use brandloom_core::StatusEvent;
use brandloom_session::{ChannelSink, SessionContext};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::SharedState;

/// Agent that handles raw user messages.
const ENTRY_AGENT: &str = "orchestrator";

/// One inbound socket frame, decoded loosely so clients can evolve.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    chat_id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

pub async fn ws_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let session = match state.registry.create(None, None).await {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "Failed to create session for connection");
            return;
        }
    };
    let session_id = session.session_id().to_string();
    info!(session_id, "WebSocket connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // All outbound traffic funnels through one channel so status events and
    // replies share the single socket writer.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let (sink, mut event_rx) = ChannelSink::bounded(64);
    session.attach_sink(Arc::new(sink)).await;
    let event_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if event_out.send(text).await.is_err() {
                break;
            }
        }
    });

    send_event(
        &out_tx,
        &StatusEvent::SessionStarted {
            session_id: session_id.clone(),
            timestamp: Utc::now(),
        },
    )
    .await;

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => {
                handle_frame(&state, &session, &out_tx, text.as_str()).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    info!(session_id, "WebSocket disconnected");
    session.detach_sink().await;
    if let Err(e) = session.flush().await {
        warn!(session_id, error = %e, "Flush on disconnect failed");
    }
    state.registry.remove(&session_id).await;

    drop(out_tx);
    forwarder.abort();
    let _ = writer.await;
}

async fn handle_frame(
    state: &SharedState,
    session: &Arc<SessionContext>,
    out_tx: &mpsc::Sender<String>,
    raw: &str,
) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(_) => {
            debug!("Unrecognized frame dropped");
            send_json(out_tx, &json!({"error": "unrecognized frame"})).await;
            return;
        }
    };

    if let Some(chat_id) = frame.chat_id {
        match session.bind_chat(&chat_id).await {
            Ok(()) => {
                // Record the bind as a tagged control frame so hydration
                // skips it later
                let entry =
                    MemoryEntry::control(json!({"chat_id": chat_id}).to_string());
                session.append_and_persist(ENTRY_AGENT, entry).await;
                send_event(
                    out_tx,
                    &StatusEvent::ChatSwitched {
                        session_id: session.session_id().to_string(),
                        chat_id,
                        timestamp: Utc::now(),
                    },
                )
                .await;
            }
            Err(e) => {
                warn!(error = %e, "Chat bind failed");
                send_json(out_tx, &json!({"error": format!("chat bind failed: {e}")})).await;
            }
        }
        return;
    }

    let Some(text) = frame.text.filter(|t| !t.trim().is_empty()) else {
        return;
    };

    session.save_chat_message(ChatRole::User, &text, None).await;

    match state.runtime.run(ENTRY_AGENT, session, &text).await {
        Ok(reply) => {
            send_json(out_tx, &json!({"text": reply.text, "error": reply.error})).await;
        }
        Err(e) => {
            error!(error = %e, "Orchestrator run failed");
            send_json(out_tx, &json!({"text": format!("Error: {e}"), "error": true})).await;
        }
    }
}

async fn send_event(out_tx: &mpsc::Sender<String>, event: &StatusEvent) {
    if let Ok(text) = serde_json::to_string(event) {
        let _ = out_tx.send(text).await;
    }
}

async fn send_json(out_tx: &mpsc::Sender<String>, value: &serde_json::Value) {
    let _ = out_tx.send(value.to_string()).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_frame_parses() {
        let frame: InboundFrame = serde_json::from_str(r#"{"chat_id": "c42"}"#).unwrap();
        assert_eq!(frame.chat_id.as_deref(), Some("c42"));
        assert!(frame.text.is_none());
    }

    #[test]
    fn text_frame_parses() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"text": "plan a campaign"}"#).unwrap();
        assert_eq!(frame.text.as_deref(), Some("plan a campaign"));
        assert!(frame.chat_id.is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"text": "hi", "client": "web", "v": 3}"#).unwrap();
        assert_eq!(frame.text.as_deref(), Some("hi"));
    }

    #[test]
    fn non_object_frame_is_rejected() {
        assert!(serde_json::from_str::<InboundFrame>("[1,2]").is_err());
    }
}
