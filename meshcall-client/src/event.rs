use crate::engine::TrackKind;
use crate::peer::NegotiationState;
use crate::publisher::{SurfaceId, TrackOwner};
use meshcall_core::{Participant, ParticipantId, RoomId};

/// Everything the client reports to the embedding application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The relay acknowledged our join.
    Joined {
        handle: ParticipantId,
        room: RoomId,
        existing: Vec<Participant>,
    },
    /// Authoritative member list of the current room.
    Presence(Vec<Participant>),
    PeerStateChanged {
        peer: ParticipantId,
        from: NegotiationState,
        to: NegotiationState,
    },
    /// The media transport towards `peer` is up.
    PeerConnected(ParticipantId),
    /// The reconnection pass failed as well; no further retries.
    PeerUnreachable(ParticipantId),
    Chat {
        name: String,
        text: String,
        timestamp: u64,
    },
    /// A surface and a track exist for the same owner.
    TrackReady {
        owner: TrackOwner,
        kind: TrackKind,
        track_id: String,
        surface: SurfaceId,
    },
    ServerError(String),
    /// The signaling connection is gone.
    Disconnected,
}
