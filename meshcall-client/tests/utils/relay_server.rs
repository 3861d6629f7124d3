use anyhow::{Context, Result};
use meshcall_client::{ClientConfig, ClientEvent, MeshClient, MeshClientHandle};
use meshcall_server::{ServerConfig, serve_on};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use super::mock_engine::MockEngine;
use super::signal_helpers::SIGNAL_TIMEOUT_MS;

/// Start a relay on an ephemeral localhost port.
pub async fn spawn_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let config = ServerConfig {
        bind_addr: addr,
        ..Default::default()
    };

    tokio::spawn(async move {
        if let Err(e) = serve_on(listener, config, std::future::pending()).await {
            tracing::error!("[TestServer] {:?}", e);
        }
    });

    Ok(addr)
}

/// A client talking to a real relay over WebSocket.
pub struct WsPeer {
    pub client: MeshClientHandle<MockEngine>,
    pub engine: MockEngine,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl WsPeer {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let engine = MockEngine::new();
        let config = ClientConfig {
            server_url: format!("ws://{}/ws", addr),
            ..Default::default()
        };
        let (client, events) = MeshClient::spawn(config, Arc::new(engine.clone()))
            .await
            .context("Failed to connect client")?;
        Ok(Self::from_parts(client, engine, events))
    }

    pub fn from_parts(
        client: MeshClientHandle<MockEngine>,
        engine: MockEngine,
        events: mpsc::UnboundedReceiver<ClientEvent>,
    ) -> Self {
        Self { client, engine, events }
    }

    pub async fn wait_event(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> Result<ClientEvent> {
        let timeout = Duration::from_millis(SIGNAL_TIMEOUT_MS);
        loop {
            let event = tokio::time::timeout(timeout, self.events.recv())
                .await
                .context("Timeout waiting for client event")?
                .context("Client event stream closed")?;
            if pred(&event) {
                return Ok(event);
            }
        }
    }
}
