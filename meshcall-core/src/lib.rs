pub mod model;
pub mod utils;

pub use model::{
    ClientMessage, IceCandidate, IceServerConfig, Participant, ParticipantId, RoomId,
    ServerMessage,
};
