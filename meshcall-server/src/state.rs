use crate::ServerConfig;
use crate::room::RoomRegistry;
use crate::signaling::SignalingService;
use std::sync::Arc;

/// Shared state handed to every WebSocket connection.
#[derive(Clone)]
pub struct ServerState {
    pub signaling: SignalingService,
    pub registry: RoomRegistry,
}

impl ServerState {
    pub fn new(config: &ServerConfig) -> Self {
        let signaling = SignalingService::new(config.ice_servers.clone());
        let registry = RoomRegistry::with_capacity(Arc::new(signaling.clone()), config.room_capacity);

        Self {
            signaling,
            registry,
        }
    }
}
