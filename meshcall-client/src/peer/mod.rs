mod manager;
mod negotiation;
mod peer_directory;
mod peer_task;

pub use manager::*;
pub use negotiation::*;
pub use peer_directory::*;
pub(crate) use peer_task::*;
