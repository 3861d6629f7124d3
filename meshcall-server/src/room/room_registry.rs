use crate::error::RegistryError;
use crate::room::{Room, RoomCommand};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use meshcall_core::{Participant, ParticipantId, RoomId, ServerMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const MAX_JOIN_ATTEMPTS: usize = 3;
pub const DEFAULT_ROOM_CAPACITY: usize = 100;

#[derive(Clone)]
struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
    instance: u64,
}

/// A join the room has not confirmed yet. Dropping it unconfirmed removes
/// the membership and queues a `Leave`, so a room created for a cancelled
/// join still sees its member count reach zero and shuts down.
struct PendingJoin<'a> {
    memberships: &'a DashMap<ParticipantId, RoomId>,
    handle: ParticipantId,
    room_id: &'a RoomId,
    tx: Option<mpsc::Sender<RoomCommand>>,
}

impl PendingJoin<'_> {
    fn confirm(mut self) {
        self.tx = None;
    }
}

impl Drop for PendingJoin<'_> {
    fn drop(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        self.memberships.remove_if(&self.handle, |_, r| r == self.room_id);

        let leave = RoomCommand::Leave { handle: self.handle };
        if let Err(TrySendError::Full(leave)) = tx.try_send(leave)
            && let Ok(runtime) = tokio::runtime::Handle::try_current()
        {
            runtime.spawn(async move {
                let _ = tx.send(leave).await;
            });
        }
    }
}

/// Maps room ids to live room actors and connection handles to the room
/// they are in. Rooms are created on first join and vanish when empty.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    memberships: Arc<DashMap<ParticipantId, RoomId>>,
    signaling: Arc<dyn SignalingOutput>,
    next_instance: Arc<AtomicU64>,
    capacity: usize,
}

impl RoomRegistry {
    pub fn new(signaling: Arc<dyn SignalingOutput>) -> Self {
        Self::with_capacity(signaling, DEFAULT_ROOM_CAPACITY)
    }

    pub fn with_capacity(signaling: Arc<dyn SignalingOutput>, capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            memberships: Arc::new(DashMap::new()),
            signaling,
            next_instance: Arc::new(AtomicU64::new(0)),
            capacity: capacity.max(1),
        }
    }

    fn get_room_handle(&self, room_id: &RoomId) -> RoomHandle {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!("Creating new room: {}", room_id);
                let (tx, rx) = mpsc::channel(self.capacity);
                let instance = self.next_instance.fetch_add(1, Ordering::Relaxed);

                let room = Room::new(room_id.clone(), rx, self.signaling.clone());
                let rooms = self.rooms.clone();
                let id = room_id.clone();
                tokio::spawn(async move {
                    room.run().await;
                    rooms.remove_if(&id, |_, h| h.instance == instance);
                });

                RoomHandle { tx, instance }
            })
            .clone()
    }

    fn evict(&self, room_id: &RoomId, instance: u64) {
        self.rooms.remove_if(room_id, |_, h| h.instance == instance);
    }

    fn room_sender(&self, handle: &ParticipantId) -> Result<(RoomId, mpsc::Sender<RoomCommand>), RegistryError> {
        let room_id = self
            .memberships
            .get(handle)
            .map(|r| r.value().clone())
            .ok_or(RegistryError::NotInRoom)?;
        let tx = self
            .rooms
            .get(&room_id)
            .map(|h| h.tx.clone())
            .ok_or_else(|| RegistryError::RoomUnavailable(room_id.clone()))?;
        Ok((room_id, tx))
    }

    /// Registers `participant` in `room_id`. A connection may be in at most
    /// one room; joining a second time is an error.
    pub async fn join(&self, room_id: &RoomId, participant: Participant) -> Result<(), RegistryError> {
        let handle = participant.handle;
        if let Some(current) = self.memberships.get(&handle) {
            return Err(RegistryError::AlreadyInRoom(current.value().clone()));
        }

        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let room = self.get_room_handle(room_id);
            let (reply_tx, reply_rx) = oneshot::channel();

            // Membership must be visible before presence goes out, otherwise
            // the newcomer could not relay an answer to an early offer.
            self.memberships.insert(handle, room_id.clone());
            let pending = PendingJoin {
                memberships: &self.memberships,
                handle,
                room_id,
                tx: Some(room.tx.clone()),
            };

            let cmd = RoomCommand::Join {
                participant: participant.clone(),
                reply: reply_tx,
            };
            if room.tx.send(cmd).await.is_ok() && reply_rx.await.is_ok() {
                pending.confirm();
                return Ok(());
            }

            drop(pending);
            debug!(
                "Room '{}' closed during join of {} (attempt {})",
                room_id, handle, attempt
            );
            self.evict(room_id, room.instance);
        }

        Err(RegistryError::RoomUnavailable(room_id.clone()))
    }

    /// Forwards `message` to `target` if both share the sender's room.
    /// A missing target is a departure race and is dropped silently.
    pub async fn relay(&self, sender: ParticipantId, target: ParticipantId, message: ServerMessage) {
        let (room_id, tx) = match self.room_sender(&sender) {
            Ok(found) => found,
            Err(e) => {
                warn!("Relay of {} from {} ignored: {}", message.event(), sender, e);
                return;
            }
        };

        if self.memberships.get(&target).is_none_or(|r| *r.value() != room_id) {
            debug!(
                "Relay of {} from {} to {} dropped: target not in '{}'",
                message.event(),
                sender,
                target,
                room_id
            );
            return;
        }

        let cmd = RoomCommand::Relay {
            sender,
            target,
            message,
        };
        if tx.send(cmd).await.is_err() {
            debug!("Room '{}' closed while relaying from {}", room_id, sender);
        }
    }

    pub async fn chat(&self, sender: ParticipantId, room_id: &RoomId, text: String) -> Result<(), RegistryError> {
        let (current, tx) = self.room_sender(&sender)?;
        if &current != room_id {
            return Err(RegistryError::WrongRoom(room_id.clone()));
        }
        tx.send(RoomCommand::Chat { sender, text })
            .await
            .map_err(|_| RegistryError::RoomUnavailable(current))
    }

    pub async fn rename(&self, handle: ParticipantId, name: String) -> Result<(), RegistryError> {
        let (room_id, tx) = self.room_sender(&handle)?;
        tx.send(RoomCommand::Rename { handle, name })
            .await
            .map_err(|_| RegistryError::RoomUnavailable(room_id))
    }

    /// Removes `handle` from its room, if any. Safe to call more than once.
    pub async fn leave(&self, handle: ParticipantId) {
        let Some((_, room_id)) = self.memberships.remove(&handle) else {
            return;
        };
        let Some(tx) = self.rooms.get(&room_id).map(|h| h.tx.clone()) else {
            return;
        };
        if tx.send(RoomCommand::Leave { handle }).await.is_err() {
            debug!("Room '{}' already closed when {} left", room_id, handle);
        }
    }

    pub async fn members(&self, room_id: &RoomId) -> Vec<Participant> {
        let Some(tx) = self.rooms.get(room_id).map(|h| h.tx.clone()) else {
            return Vec::new();
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send(RoomCommand::Members { reply: reply_tx }).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub fn room_of(&self, handle: &ParticipantId) -> Option<RoomId> {
        self.memberships.get(handle).map(|r| r.value().clone())
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
