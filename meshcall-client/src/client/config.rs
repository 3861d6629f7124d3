use crate::peer::DEFAULT_ORPHAN_CANDIDATE_LIMIT;
use meshcall_core::IceServerConfig;
use std::time::Duration;

pub const DEFAULT_REOFFER_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay, e.g. `ws://127.0.0.1:5001/ws`.
    pub server_url: String,
    /// Early candidates kept per unknown sender.
    pub orphan_candidate_limit: usize,
    /// When non-empty, used instead of the servers the relay announces.
    pub ice_servers: Vec<IceServerConfig>,
    /// How long a responder whose transport failed waits for a new offer
    /// before reporting the peer unreachable.
    pub reoffer_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:5001/ws".to_owned(),
            orphan_candidate_limit: DEFAULT_ORPHAN_CANDIDATE_LIMIT,
            ice_servers: Vec::new(),
            reoffer_timeout: DEFAULT_REOFFER_TIMEOUT,
        }
    }
}
