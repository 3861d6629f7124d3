use crate::peer::{NegotiationState, PeerCommand, Role};
use dashmap::DashMap;
use meshcall_core::ParticipantId;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Handle to one running peer task.
pub struct PeerHandle<T> {
    role: Role,
    commands: mpsc::UnboundedSender<PeerCommand<T>>,
    cancel: watch::Sender<bool>,
    state: watch::Receiver<NegotiationState>,
}

impl<T> PeerHandle<T> {
    pub(crate) fn new(
        role: Role,
        commands: mpsc::UnboundedSender<PeerCommand<T>>,
        cancel: watch::Sender<bool>,
        state: watch::Receiver<NegotiationState>,
    ) -> Self {
        Self {
            role,
            commands,
            cancel,
            state,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        *self.state.borrow()
    }

    pub(crate) fn send(&self, cmd: PeerCommand<T>) -> bool {
        self.commands.send(cmd).is_ok()
    }

    pub(crate) fn commands(&self) -> mpsc::UnboundedSender<PeerCommand<T>> {
        self.commands.clone()
    }

    /// Abort whatever the task is doing and close the record.
    pub(crate) fn close(&self) {
        self.cancel.send_replace(true);
    }
}

/// Live peer records keyed by remote handle, shared between the manager
/// and the track publisher.
pub struct PeerDirectory<T> {
    peers: Arc<DashMap<ParticipantId, PeerHandle<T>>>,
}

impl<T> Clone for PeerDirectory<T> {
    fn clone(&self) -> Self {
        Self {
            peers: self.peers.clone(),
        }
    }
}

impl<T> Default for PeerDirectory<T> {
    fn default() -> Self {
        Self {
            peers: Arc::new(DashMap::new()),
        }
    }
}

impl<T> PeerDirectory<T> {
    pub fn contains(&self, handle: &ParticipantId) -> bool {
        self.peers.contains_key(handle)
    }

    pub fn handles(&self) -> Vec<ParticipantId> {
        let mut handles: Vec<_> = self.peers.iter().map(|e| *e.key()).collect();
        handles.sort();
        handles
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn state(&self, handle: &ParticipantId) -> Option<NegotiationState> {
        self.peers.get(handle).map(|p| p.state())
    }

    pub fn role(&self, handle: &ParticipantId) -> Option<Role> {
        self.peers.get(handle).map(|p| p.role())
    }

    pub fn subscribe(&self, handle: &ParticipantId) -> Option<watch::Receiver<NegotiationState>> {
        self.peers.get(handle).map(|p| p.state.clone())
    }

    pub(crate) fn insert(&self, handle: ParticipantId, peer: PeerHandle<T>) {
        self.peers.insert(handle, peer);
    }

    pub(crate) fn send(&self, handle: &ParticipantId, cmd: PeerCommand<T>) -> bool {
        self.peers.get(handle).is_some_and(|p| p.send(cmd))
    }

    pub(crate) fn senders(&self) -> Vec<(ParticipantId, mpsc::UnboundedSender<PeerCommand<T>>)> {
        self.peers.iter().map(|e| (*e.key(), e.commands())).collect()
    }

    /// Removes and closes the record for `handle`.
    pub(crate) fn remove(&self, handle: &ParticipantId) -> bool {
        match self.peers.remove(handle) {
            Some((_, peer)) => {
                peer.close();
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear(&self) {
        let handles = self.handles();
        for handle in handles {
            self.remove(&handle);
        }
    }
}
