use async_trait::async_trait;
use meshcall_core::ClientMessage;

/// Outbound half of the relay connection. Delivery is best effort.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send(&self, msg: ClientMessage);
}
