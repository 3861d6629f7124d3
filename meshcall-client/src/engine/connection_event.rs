use crate::engine::TrackKind;
use meshcall_core::{IceCandidate, ParticipantId};

/// Transport-level state as reported by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl TransportState {
    /// States that count as a negotiation or transport failure.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }
}

/// Asynchronous callbacks from one engine connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    CandidateGenerated(ParticipantId, IceCandidate),
    StateChanged(ParticipantId, TransportState),
    RemoteTrack {
        remote: ParticipantId,
        kind: TrackKind,
        track_id: String,
    },
}
