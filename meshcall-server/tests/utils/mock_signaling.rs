use async_trait::async_trait;
use meshcall_core::{ParticipantId, ServerMessage};
use meshcall_server::SignalingOutput;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Mock SignalingOutput that captures every delivered frame.
#[derive(Clone)]
pub struct MockSignalingOutput {
    /// Channel to stream captured frames.
    tx: mpsc::UnboundedSender<(ParticipantId, ServerMessage)>,
    /// All captured frames, in delivery order.
    signals: Arc<Mutex<Vec<(ParticipantId, ServerMessage)>>>,
}

impl MockSignalingOutput {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ParticipantId, ServerMessage)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let signaling = Self {
            tx,
            signals: Arc::new(Mutex::new(Vec::new())),
        };
        (signaling, rx)
    }

    /// Create a MockSignalingOutput without a receiver (frames are only stored).
    pub fn new_stored_only() -> Self {
        let (signaling, _rx) = Self::new();
        signaling
    }

    /// Every frame delivered to `handle`, oldest first.
    pub async fn messages_for(&self, handle: &ParticipantId) -> Vec<ServerMessage> {
        self.signals
            .lock()
            .await
            .iter()
            .filter(|(h, _)| h == handle)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Event names delivered to `handle`, oldest first.
    pub async fn events_for(&self, handle: &ParticipantId) -> Vec<&'static str> {
        self.messages_for(handle)
            .await
            .iter()
            .map(|m| m.event())
            .collect()
    }

    pub async fn clear(&self) {
        self.signals.lock().await.clear();
    }
}

impl Default for MockSignalingOutput {
    fn default() -> Self {
        Self::new_stored_only()
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn deliver(&self, handle: ParticipantId, msg: ServerMessage) {
        tracing::debug!("[MockSignaling] {} to {}", msg.event(), handle);

        self.signals.lock().await.push((handle, msg.clone()));
        let _ = self.tx.send((handle, msg));
    }
}
