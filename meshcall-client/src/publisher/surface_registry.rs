use crate::engine::TrackKind;
use crate::event::ClientEvent;
use meshcall_core::ParticipantId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Whose media a surface shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackOwner {
    Local,
    Remote(ParticipantId),
}

impl fmt::Display for TrackOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote(handle) => write!(f, "remote {}", handle),
        }
    }
}

/// Opaque name of a rendering destination owned by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub String);

impl From<&str> for SurfaceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[derive(Default)]
struct Slot {
    surface: Option<SurfaceId>,
    tracks: HashMap<TrackKind, String>,
}

/// Pairs rendering surfaces with tracks. `TrackReady` is emitted as soon
/// as both halves exist, whichever arrives first.
#[derive(Clone)]
pub struct SurfaceRegistry {
    slots: Arc<Mutex<HashMap<TrackOwner, Slot>>>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl SurfaceRegistry {
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    fn with_slots<R>(&self, f: impl FnOnce(&mut HashMap<TrackOwner, Slot>) -> R) -> R {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut slots)
    }

    fn emit(&self, owner: TrackOwner, kind: TrackKind, track_id: String, surface: SurfaceId) {
        debug!("Track {} of {} ready for surface {:?}", track_id, owner, surface.0);
        let _ = self.events.send(ClientEvent::TrackReady {
            owner,
            kind,
            track_id,
            surface,
        });
    }

    pub fn register_surface(&self, owner: TrackOwner, surface: SurfaceId) {
        let ready: Vec<(TrackKind, String)> = self.with_slots(|slots| {
            let slot = slots.entry(owner).or_default();
            slot.surface = Some(surface.clone());
            slot.tracks.iter().map(|(k, id)| (*k, id.clone())).collect()
        });

        for (kind, track_id) in ready {
            self.emit(owner, kind, track_id, surface.clone());
        }
    }

    pub fn unregister_surface(&self, owner: TrackOwner) {
        self.with_slots(|slots| {
            if let Some(slot) = slots.get_mut(&owner) {
                slot.surface = None;
            }
        });
    }

    /// Record the current track of `kind` for `owner`. Re-announcing the
    /// same track id is a no-op.
    pub fn track_available(&self, owner: TrackOwner, kind: TrackKind, track_id: impl Into<String>) {
        let track_id = track_id.into();
        let surface = self.with_slots(|slots| {
            let slot = slots.entry(owner).or_default();
            if slot.tracks.get(&kind) == Some(&track_id) {
                return None;
            }
            slot.tracks.insert(kind, track_id.clone());
            slot.surface.clone()
        });

        if let Some(surface) = surface {
            self.emit(owner, kind, track_id, surface);
        }
    }

    pub fn track_removed(&self, owner: TrackOwner, kind: TrackKind) {
        self.with_slots(|slots| {
            if let Some(slot) = slots.get_mut(&owner) {
                slot.tracks.remove(&kind);
            }
        });
    }

    /// Forget everything about `owner`.
    pub fn remove_owner(&self, owner: TrackOwner) {
        self.with_slots(|slots| slots.remove(&owner));
    }

    pub fn owners(&self) -> Vec<TrackOwner> {
        self.with_slots(|slots| slots.keys().copied().collect())
    }
}
