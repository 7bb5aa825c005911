//! Channel-backed status sink.

use async_trait::async_trait;
use brandloom_core::{StatusEvent, StatusSink};
use tokio::sync::mpsc;
use tracing::debug;

/// Bridges status events onto a bounded mpsc channel, typically drained by a
/// WebSocket writer task.
///
/// Uses `try_send`: when the channel is full the event is dropped, keeping
/// the execution loop decoupled from slow clients.
pub struct ChannelSink {
    tx: mpsc::Sender<StatusEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StatusEvent>) -> Self {
        Self { tx }
    }

    /// Convenience constructor returning the sink and its receiver.
    pub fn bounded(buffer: usize) -> (Self, mpsc::Receiver<StatusEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl StatusSink for ChannelSink {
    async fn emit(&self, event: StatusEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Status channel full or closed, event dropped");
                false
            }
        }
    }
}
