use crate::client::{ClientCommand, ClientConfig, ClientSnapshot};
use crate::engine::MediaEngine;
use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::peer::{NegotiationState, PeerConnectionManager, PeerContext, PeerDirectory, Role};
use crate::publisher::{SurfaceRegistry, TrackPublisher};
use crate::signaling::{SignalSink, WsSignaling};
use meshcall_core::{ParticipantId, RoomId, ServerMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::info;

/// Client actor: owns the peer connection manager and applies relay
/// frames and API calls one at a time.
pub struct MeshClient<E: MediaEngine> {
    manager: PeerConnectionManager<E>,
    incoming: mpsc::UnboundedReceiver<ServerMessage>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<E: MediaEngine> MeshClient<E> {
    /// Connect to `config.server_url` and start the client.
    pub async fn spawn(
        config: ClientConfig,
        engine: Arc<E>,
    ) -> Result<(MeshClientHandle<E>, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let (signaling, incoming) = WsSignaling::connect(&config.server_url).await?;
        Ok(Self::spawn_with(config, engine, Arc::new(signaling), incoming))
    }

    /// Start the client over an already established relay connection.
    pub fn spawn_with(
        config: ClientConfig,
        engine: Arc<E>,
        signaling: Arc<dyn SignalSink>,
        incoming: mpsc::UnboundedReceiver<ServerMessage>,
    ) -> (MeshClientHandle<E>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let ice_locked = !config.ice_servers.is_empty();
        if ice_locked {
            engine.configure_ice(config.ice_servers.clone());
        }

        let peers = PeerDirectory::default();
        let surfaces = SurfaceRegistry::new(events_tx.clone());
        let publisher = TrackPublisher::new(engine.clone(), peers.clone(), surfaces.clone());

        let ctx = PeerContext {
            engine,
            tracks: publisher.shared_tracks(),
            signaling,
            surfaces: surfaces.clone(),
            events: events_tx.clone(),
            reoffer_timeout: config.reoffer_timeout,
        };
        let manager = PeerConnectionManager::new(ctx, peers.clone(), config.orphan_candidate_limit, ice_locked);

        let client = Self {
            manager,
            incoming,
            commands: cmd_rx,
            events: events_tx,
        };
        tokio::spawn(client.run());

        let handle = MeshClientHandle {
            commands: cmd_tx,
            peers,
            publisher,
            surfaces,
        };
        (handle, events_rx)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.incoming.recv() => match msg {
                    Some(msg) => self.manager.handle_server_message(msg).await,
                    None => {
                        info!("Relay connection lost");
                        self.manager.close_all();
                        let _ = self.events.send(ClientEvent::Disconnected);
                        break;
                    }
                },
                cmd = self.commands.recv() => match cmd {
                    Some(ClientCommand::Shutdown) | None => {
                        self.manager.close_all();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                },
            }
        }
        info!("Client stopped");
    }

    async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Join { room, name } => self.manager.join_room(room, name).await,
            ClientCommand::Chat { text, reply } => {
                let _ = reply.send(self.manager.send_chat(text).await);
            }
            ClientCommand::Rename { name, reply } => {
                let _ = reply.send(self.manager.rename(name).await);
            }
            ClientCommand::Leave { reply } => {
                let _ = reply.send(self.manager.leave_room().await);
            }
            ClientCommand::Snapshot { reply } => {
                let _ = reply.send(ClientSnapshot {
                    handle: self.manager.local_handle(),
                    room: self.manager.room().cloned(),
                    presence: self.manager.presence().to_vec(),
                });
            }
            ClientCommand::Shutdown => {}
        }
    }
}

/// Cheap handle to a running [`MeshClient`].
pub struct MeshClientHandle<E: MediaEngine> {
    commands: mpsc::UnboundedSender<ClientCommand>,
    peers: PeerDirectory<E::Track>,
    publisher: TrackPublisher<E>,
    surfaces: SurfaceRegistry,
}

impl<E: MediaEngine> Clone for MeshClientHandle<E> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            peers: self.peers.clone(),
            publisher: self.publisher.clone(),
            surfaces: self.surfaces.clone(),
        }
    }
}

impl<E: MediaEngine> MeshClientHandle<E> {
    fn send(&self, cmd: ClientCommand) -> Result<(), ClientError> {
        self.commands.send(cmd).map_err(|_| ClientError::Shutdown)
    }

    async fn call<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> ClientCommand) -> Result<R, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| ClientError::Shutdown)
    }

    /// Ask the relay to add us to `room`. Completion is reported as
    /// [`ClientEvent::Joined`].
    pub fn join(&self, room: impl Into<RoomId>, name: impl Into<String>) -> Result<(), ClientError> {
        self.send(ClientCommand::Join {
            room: room.into(),
            name: name.into(),
        })
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let text = text.into();
        self.call(|reply| ClientCommand::Chat { text, reply }).await?
    }

    pub async fn rename(&self, name: impl Into<String>) -> Result<(), ClientError> {
        let name = name.into();
        self.call(|reply| ClientCommand::Rename { name, reply }).await?
    }

    /// Leave the room, close every peer and release local captures.
    pub async fn leave(&self) -> Result<(), ClientError> {
        let left = self.call(|reply| ClientCommand::Leave { reply }).await?;
        self.publisher.stop_all().await;
        left
    }

    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        self.call(|reply| ClientCommand::Snapshot { reply }).await
    }

    pub fn shutdown(&self) {
        let _ = self.send(ClientCommand::Shutdown);
    }

    pub fn publisher(&self) -> &TrackPublisher<E> {
        &self.publisher
    }

    pub fn surfaces(&self) -> &SurfaceRegistry {
        &self.surfaces
    }

    pub fn peers(&self) -> Vec<ParticipantId> {
        self.peers.handles()
    }

    pub fn peer_state(&self, peer: &ParticipantId) -> Option<NegotiationState> {
        self.peers.state(peer)
    }

    pub fn peer_role(&self, peer: &ParticipantId) -> Option<Role> {
        self.peers.role(peer)
    }

    pub fn subscribe_state(&self, peer: &ParticipantId) -> Option<watch::Receiver<NegotiationState>> {
        self.peers.subscribe(peer)
    }
}
