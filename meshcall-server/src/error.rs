use meshcall_core::RoomId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("already joined room '{0}'")]
    AlreadyInRoom(RoomId),

    #[error("not a member of any room")]
    NotInRoom,

    #[error("not a member of room '{0}'")]
    WrongRoom(RoomId),

    #[error("room '{0}' is unavailable")]
    RoomUnavailable(RoomId),
}
