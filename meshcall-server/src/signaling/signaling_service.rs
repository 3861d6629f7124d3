use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use meshcall_core::{IceServerConfig, ParticipantId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct SignalingInner {
    peers: DashMap<ParticipantId, mpsc::UnboundedSender<Message>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Holds the outbound half of every connected WebSocket, keyed by handle.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                ice_servers,
            }),
        }
    }

    pub fn get_ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn add_peer(&self, handle: ParticipantId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.peers.insert(handle, tx);
    }

    pub fn remove_peer(&self, handle: &ParticipantId) {
        self.inner.peers.remove(handle);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn send_signal(&self, handle: ParticipantId, msg: &ServerMessage) {
        let Some(peer) = self.inner.peers.get(&handle) else {
            debug!("Dropping {} for disconnected peer {}", msg.event(), handle);
            return;
        };

        match serde_json::to_string(msg) {
            Ok(json) => {
                if let Err(e) = peer.send(Message::Text(json.into())) {
                    error!("Failed to send WS message to {}: {:?}", handle, e);
                }
            }
            Err(e) => error!("Failed to serialize signal message: {}", e),
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn deliver(&self, handle: ParticipantId, msg: ServerMessage) {
        self.send_signal(handle, &msg);
    }
}
