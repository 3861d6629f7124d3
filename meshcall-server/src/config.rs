use crate::room::DEFAULT_ROOM_CAPACITY;
use meshcall_core::IceServerConfig;
use meshcall_core::utils::default_ice_servers;
use std::net::SocketAddr;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Pushed to every client in the `ice-config` frame.
    pub ice_servers: Vec<IceServerConfig>,
    /// Depth of each room's command queue.
    pub room_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5001)),
            ice_servers: default_ice_servers(),
            room_capacity: DEFAULT_ROOM_CAPACITY,
        }
    }
}
