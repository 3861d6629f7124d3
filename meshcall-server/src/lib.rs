mod config;
mod error;
mod room;
mod router;
mod signaling;
mod state;

pub use config::*;
pub use error::*;
pub use room::*;
pub use router::*;
pub use signaling::*;
pub use state::*;
