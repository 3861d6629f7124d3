use crate::error::ClientError;
use meshcall_core::{Participant, ParticipantId, RoomId};
use tokio::sync::oneshot;

pub(crate) enum ClientCommand {
    Join {
        room: RoomId,
        name: String,
    },
    Chat {
        text: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Rename {
        name: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Leave {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Snapshot {
        reply: oneshot::Sender<ClientSnapshot>,
    },
    Shutdown,
}

/// Point-in-time view of the client's room state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSnapshot {
    pub handle: Option<ParticipantId>,
    pub room: Option<RoomId>,
    pub presence: Vec<Participant>,
}
