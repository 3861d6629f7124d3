use async_trait::async_trait;
use meshcall_core::{ParticipantId, ServerMessage};

/// Delivery side of the relay: whatever holds the client transports
/// implements this so rooms can push frames to individual handles.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Deliver `msg` to `handle`. Delivery is best effort; an unknown or
    /// disconnected handle is not an error.
    async fn deliver(&self, handle: ParticipantId, msg: ServerMessage);
}
