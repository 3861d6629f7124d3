use crate::room::room_command::RoomCommand;
use crate::signaling::SignalingOutput;
use meshcall_core::utils::unix_millis;
use meshcall_core::{Participant, ParticipantId, RoomId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A single room. Owns the member list and serializes every mutation through
/// its command queue, so joins, leaves and presence snapshots never interleave.
pub struct Room {
    id: RoomId,
    members: Vec<Participant>,
    command_rx: mpsc::Receiver<RoomCommand>,
    signaling: Arc<dyn SignalingOutput>,
}

impl Room {
    pub fn new(
        id: RoomId,
        command_rx: mpsc::Receiver<RoomCommand>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        Self {
            id,
            members: Vec::new(),
            command_rx,
            signaling,
        }
    }

    /// Runs until the last member leaves or every sender is dropped.
    pub async fn run(mut self) {
        info!("Room '{}' event loop started", self.id);

        while let Some(cmd) = self.command_rx.recv().await {
            let was_leave = matches!(cmd, RoomCommand::Leave { .. });
            self.handle_command(cmd).await;

            if was_leave && self.members.is_empty() {
                self.shutdown().await;
                break;
            }
        }

        info!("Room '{}' event loop finished", self.id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join { participant, reply } => {
                self.join(participant).await;
                let _ = reply.send(());
            }

            RoomCommand::Relay {
                sender,
                target,
                message,
            } => {
                if !self.contains(&sender) {
                    warn!(
                        "Room '{}': relay from non-member {} dropped",
                        self.id, sender
                    );
                    return;
                }
                if !self.contains(&target) {
                    debug!(
                        "Room '{}': target {} already gone, dropping {}",
                        self.id,
                        target,
                        message.event()
                    );
                    return;
                }
                self.signaling.deliver(target, message).await;
            }

            RoomCommand::Chat { sender, text } => {
                let Some(name) = self.name_of(&sender) else {
                    warn!("Room '{}': chat from non-member {} dropped", self.id, sender);
                    return;
                };
                let msg = ServerMessage::ChatMessage {
                    name,
                    text,
                    timestamp: unix_millis(),
                };
                self.broadcast(msg, None).await;
            }

            RoomCommand::Rename { handle, name } => {
                let Some(member) = self.members.iter_mut().find(|m| m.handle == handle) else {
                    warn!("Room '{}': rename for non-member {}", self.id, handle);
                    return;
                };
                info!("Room '{}': {} renamed to '{}'", self.id, handle, name);
                member.name = name;
                self.broadcast_user_list().await;
            }

            RoomCommand::Leave { handle } => {
                let before = self.members.len();
                self.members.retain(|m| m.handle != handle);
                if self.members.len() == before {
                    return;
                }

                info!("Room '{}': {} left ({} remain)", self.id, handle, self.members.len());
                self.broadcast(ServerMessage::UserLeft(handle), None).await;
                self.broadcast_user_list().await;
            }

            RoomCommand::Members { reply } => {
                let _ = reply.send(self.members.clone());
            }
        }
    }

    async fn join(&mut self, participant: Participant) {
        let handle = participant.handle;
        if self.contains(&handle) {
            warn!("Room '{}': {} is already a member", self.id, handle);
            return;
        }

        info!(
            "Room '{}': {} joined as '{}'",
            self.id, handle, participant.name
        );

        let existing = self.members.clone();
        self.members.push(participant.clone());

        self.signaling
            .deliver(handle, ServerMessage::ExistingUsers(existing))
            .await;
        self.broadcast(ServerMessage::UserJoined(participant), Some(handle))
            .await;
        self.broadcast_user_list().await;
    }

    async fn broadcast_user_list(&self) {
        self.broadcast(ServerMessage::UserList(self.members.clone()), None)
            .await;
    }

    async fn broadcast(&self, msg: ServerMessage, except: Option<ParticipantId>) {
        for member in &self.members {
            if Some(member.handle) == except {
                continue;
            }
            self.signaling.deliver(member.handle, msg.clone()).await;
        }
    }

    /// Stop accepting commands. Joins that raced into the queue lose their
    /// reply so the registry retries them against a fresh room.
    async fn shutdown(&mut self) {
        self.command_rx.close();
        while let Some(cmd) = self.command_rx.recv().await {
            if let RoomCommand::Members { reply } = cmd {
                let _ = reply.send(Vec::new());
            }
        }
        info!("Room '{}' is empty, closing", self.id);
    }

    fn contains(&self, handle: &ParticipantId) -> bool {
        self.members.iter().any(|m| &m.handle == handle)
    }

    fn name_of(&self, handle: &ParticipantId) -> Option<String> {
        self.members
            .iter()
            .find(|m| &m.handle == handle)
            .map(|m| m.name.clone())
    }
}
