mod client_command;
mod config;
mod mesh_client;

pub(crate) use client_command::ClientCommand;
pub use client_command::ClientSnapshot;
pub use config::*;
pub use mesh_client::*;
