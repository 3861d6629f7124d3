use crate::model::{IceCandidate, IceServerConfig, Participant, ParticipantId, RoomId};
use serde::{Deserialize, Serialize};

/// Frames a client sends to the relay.
///
/// Targeted variants name the recipient; the relay replaces the target with
/// the authenticated sender handle before forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom {
        room: RoomId,
        name: String,
    },
    Offer {
        target: ParticipantId,
        sdp: String,
    },
    Answer {
        target: ParticipantId,
        sdp: String,
    },
    IceCandidate {
        target: ParticipantId,
        candidate: IceCandidate,
    },
    ChatMessage {
        room: RoomId,
        text: String,
    },
    UpdateName {
        name: String,
    },
    Leave,
}

impl ClientMessage {
    pub fn target(&self) -> Option<ParticipantId> {
        match self {
            Self::Offer { target, .. }
            | Self::Answer { target, .. }
            | Self::IceCandidate { target, .. } => Some(*target),
            _ => None,
        }
    }
}

/// Frames the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        handle: ParticipantId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    ExistingUsers(Vec<Participant>),
    UserJoined(Participant),
    UserList(Vec<Participant>),
    UserLeft(ParticipantId),
    Offer {
        sdp: String,
        sender: ParticipantId,
    },
    Answer {
        sdp: String,
        sender: ParticipantId,
    },
    IceCandidate {
        candidate: IceCandidate,
        sender: ParticipantId,
    },
    ChatMessage {
        name: String,
        text: String,
        timestamp: u64,
    },
    Error {
        reason: String,
    },
}

impl ServerMessage {
    pub fn event(&self) -> &'static str {
        match self {
            Self::Welcome { .. } => "welcome",
            Self::IceConfig { .. } => "ice-config",
            Self::ExistingUsers(_) => "existing-users",
            Self::UserJoined(_) => "user-joined",
            Self::UserList(_) => "user-list",
            Self::UserLeft(_) => "user-left",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::ChatMessage { .. } => "chat-message",
            Self::Error { .. } => "error",
        }
    }
}
