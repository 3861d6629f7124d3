use crate::engine::MediaEngine;
use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::peer::{NegotiationState, PeerCommand, PeerContext, PeerDirectory, Role, spawn_peer};
use crate::publisher::TrackOwner;
use meshcall_core::{ClientMessage, IceCandidate, Participant, ParticipantId, RoomId, ServerMessage};
use std::collections::{HashMap, VecDeque};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const DEFAULT_ORPHAN_CANDIDATE_LIMIT: usize = 64;

/// Owns one peer record per remote participant and routes relay messages
/// to them. Decides the initiator for every pair from how the peer was
/// discovered.
pub struct PeerConnectionManager<E: MediaEngine> {
    ctx: PeerContext<E>,
    peers: PeerDirectory<E::Track>,
    orphans: HashMap<ParticipantId, VecDeque<IceCandidate>>,
    orphan_limit: usize,
    local: Option<ParticipantId>,
    room: Option<RoomId>,
    pending_room: Option<RoomId>,
    presence: Vec<Participant>,
    ice_locked: bool,
}

impl<E: MediaEngine> PeerConnectionManager<E> {
    /// `ice_locked` keeps the engine's ICE servers even if the relay
    /// announces others.
    pub(crate) fn new(ctx: PeerContext<E>, peers: PeerDirectory<E::Track>, orphan_limit: usize, ice_locked: bool) -> Self {
        Self {
            ctx,
            peers,
            orphans: HashMap::new(),
            orphan_limit: orphan_limit.max(1),
            local: None,
            room: None,
            pending_room: None,
            presence: Vec::new(),
            ice_locked,
        }
    }

    pub fn local_handle(&self) -> Option<ParticipantId> {
        self.local
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn presence(&self) -> &[Participant] {
        &self.presence
    }

    pub fn peers(&self) -> Vec<ParticipantId> {
        self.peers.handles()
    }

    pub fn peer_state(&self, handle: &ParticipantId) -> Option<NegotiationState> {
        self.peers.state(handle)
    }

    pub fn subscribe_state(&self, handle: &ParticipantId) -> Option<watch::Receiver<NegotiationState>> {
        self.peers.subscribe(handle)
    }

    pub fn orphan_count(&self, handle: &ParticipantId) -> usize {
        self.orphans.get(handle).map_or(0, VecDeque::len)
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.ctx.events.send(event);
    }

    pub async fn join_room(&mut self, room: RoomId, name: String) {
        if self.room.is_some() || self.pending_room.is_some() {
            warn!("Join of '{}' while already in a room; the relay will refuse it", room);
        } else {
            self.pending_room = Some(room.clone());
        }
        self.ctx.signaling.send(ClientMessage::JoinRoom { room, name }).await;
    }

    pub async fn send_chat(&self, text: String) -> Result<(), ClientError> {
        let room = self.room.clone().ok_or(ClientError::NotJoined)?;
        self.ctx.signaling.send(ClientMessage::ChatMessage { room, text }).await;
        Ok(())
    }

    pub async fn rename(&self, name: String) -> Result<(), ClientError> {
        if self.room.is_none() {
            return Err(ClientError::NotJoined);
        }
        self.ctx.signaling.send(ClientMessage::UpdateName { name }).await;
        Ok(())
    }

    /// Leave the current room and close every peer record.
    pub async fn leave_room(&mut self) -> Result<(), ClientError> {
        let Some(room) = self.room.take().or_else(|| self.pending_room.take()) else {
            return Err(ClientError::NotJoined);
        };
        info!("Leaving room '{}'", room);
        self.ctx.signaling.send(ClientMessage::Leave).await;
        self.close_all();
        Ok(())
    }

    /// Close every record without telling the relay.
    pub fn close_all(&mut self) {
        for handle in self.peers.handles() {
            self.remove_peer(&handle);
        }
        self.orphans.clear();
        self.presence.clear();
        self.room = None;
        self.pending_room = None;
    }

    fn add_peer(&mut self, handle: ParticipantId, role: Role) -> bool {
        if Some(handle) == self.local {
            return false;
        }
        if self.peers.contains(&handle) {
            warn!("Peer {} already has a record, ignoring", handle);
            return false;
        }

        let peer = spawn_peer(handle, role, &self.ctx);
        if let Some(orphans) = self.orphans.remove(&handle) {
            debug!("Replaying {} early candidates from {}", orphans.len(), handle);
            for candidate in orphans {
                peer.send(PeerCommand::RemoteCandidate(candidate));
            }
        }
        self.peers.insert(handle, peer);
        true
    }

    fn remove_peer(&mut self, handle: &ParticipantId) {
        self.orphans.remove(handle);
        self.ctx.surfaces.remove_owner(TrackOwner::Remote(*handle));
        if self.peers.remove(handle) {
            info!("Closed record for {}", handle);
        }
    }

    fn hold_orphan(&mut self, sender: ParticipantId, candidate: IceCandidate) {
        let queue = self.orphans.entry(sender).or_default();
        if queue.contains(&candidate) {
            return;
        }
        if queue.len() >= self.orphan_limit {
            queue.pop_front();
            debug!("Orphan buffer for {} full, dropped oldest candidate", sender);
        }
        queue.push_back(candidate);
    }

    pub async fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { handle } => {
                info!("Relay assigned handle {}", handle);
                self.local = Some(handle);
            }

            ServerMessage::IceConfig { ice_servers } => {
                if self.ice_locked {
                    debug!("Keeping configured ICE servers");
                } else {
                    self.ctx.engine.configure_ice(ice_servers);
                }
            }

            ServerMessage::ExistingUsers(existing) => {
                let Some(room) = self.pending_room.take() else {
                    warn!("existing-users without a pending join, ignoring");
                    return;
                };
                info!("Joined '{}' with {} existing members", room, existing.len());
                self.room = Some(room.clone());

                for member in &existing {
                    self.add_peer(member.handle, Role::Responder);
                }
                match self.local {
                    Some(handle) => self.emit(ClientEvent::Joined {
                        handle,
                        room,
                        existing,
                    }),
                    None => warn!("Joined '{}' before the relay sent a handle", room),
                }
            }

            ServerMessage::UserJoined(participant) => {
                if self.room.is_none() {
                    warn!("user-joined outside a room, ignoring");
                    return;
                }
                let handle = participant.handle;
                if !self.presence.iter().any(|p| p.handle == handle) {
                    self.presence.push(participant);
                }
                if self.add_peer(handle, Role::Initiator) {
                    self.peers.send(&handle, PeerCommand::Initiate);
                }
            }

            ServerMessage::UserList(members) => {
                let gone: Vec<ParticipantId> = self
                    .peers
                    .handles()
                    .into_iter()
                    .filter(|h| !members.iter().any(|m| &m.handle == h))
                    .collect();
                for handle in gone {
                    info!("{} missing from user-list, closing", handle);
                    self.remove_peer(&handle);
                }
                self.orphans.retain(|h, _| members.iter().any(|m| &m.handle == h));

                self.presence = members.clone();
                self.emit(ClientEvent::Presence(members));
            }

            ServerMessage::UserLeft(handle) => {
                info!("{} left the room", handle);
                self.remove_peer(&handle);
                self.presence.retain(|p| p.handle != handle);
                self.emit(ClientEvent::Presence(self.presence.clone()));
            }

            ServerMessage::Offer { sdp, sender } => {
                if !self.peers.send(&sender, PeerCommand::RemoteOffer(sdp)) {
                    warn!("Offer from unknown peer {} ignored", sender);
                }
            }

            ServerMessage::Answer { sdp, sender } => {
                if !self.peers.send(&sender, PeerCommand::RemoteAnswer(sdp)) {
                    warn!("Answer from unknown peer {} ignored", sender);
                }
            }

            ServerMessage::IceCandidate { candidate, sender } => {
                if self.peers.contains(&sender) {
                    self.peers.send(&sender, PeerCommand::RemoteCandidate(candidate));
                } else {
                    debug!("Candidate from {} before its record, holding", sender);
                    self.hold_orphan(sender, candidate);
                }
            }

            ServerMessage::ChatMessage { name, text, timestamp } => {
                self.emit(ClientEvent::Chat { name, text, timestamp });
            }

            ServerMessage::Error { reason } => {
                warn!("Relay error: {}", reason);
                if self.room.is_none() {
                    self.pending_room = None;
                }
                self.emit(ClientEvent::ServerError(reason));
            }
        }
    }
}
