use crate::error::ClientError;
use crate::signaling::SignalSink;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use meshcall_core::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// WebSocket connection to the relay.
#[derive(Clone)]
pub struct WsSignaling {
    outbound: mpsc::UnboundedSender<ClientMessage>,
}

impl WsSignaling {
    /// Connects to `url` and returns the sink together with the stream of
    /// relay frames. The stream ends when the socket closes.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>), ClientError> {
        let (ws, _) = connect_async(url).await?;
        info!("Connected to relay at {}", url);

        let (mut write, mut read) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("Failed to encode ClientMessage: {}", e);
                        continue;
                    }
                };
                if write.send(Message::text(json)).await.is_err() {
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
            debug!("Relay writer finished");
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                        Ok(msg) => {
                            if in_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid ServerMessage: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Relay socket error: {}", e);
                        break;
                    }
                }
            }
            info!("Relay connection closed");
        });

        Ok((Self { outbound: out_tx }, in_rx))
    }
}

#[async_trait]
impl SignalSink for WsSignaling {
    async fn send(&self, msg: ClientMessage) {
        if self.outbound.send(msg).is_err() {
            debug!("Relay writer gone, dropping frame");
        }
    }
}
