use meshcall_core::{Participant, ParticipantId, ServerMessage};
use tokio::sync::oneshot;

/// Commands a room actor processes one at a time.
#[derive(Debug)]
pub enum RoomCommand {
    /// Register a participant. The reply fires once presence has been pushed;
    /// a dropped reply means the room shut down and the join must be retried.
    Join {
        participant: Participant,
        reply: oneshot::Sender<()>,
    },

    /// Forward a targeted signaling message. The message already carries the
    /// sender handle stamped by the relay.
    Relay {
        sender: ParticipantId,
        target: ParticipantId,
        message: ServerMessage,
    },

    /// Broadcast a chat line to every member, sender included.
    Chat { sender: ParticipantId, text: String },

    /// Change a member's display name.
    Rename { handle: ParticipantId, name: String },

    /// Remove a member, explicitly or because its transport went away.
    Leave { handle: ParticipantId },

    /// Snapshot of the current member list.
    Members {
        reply: oneshot::Sender<Vec<Participant>>,
    },
}
