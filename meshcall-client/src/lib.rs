pub mod client;
pub mod engine;
pub mod error;
pub mod event;
pub mod peer;
pub mod publisher;
pub mod signaling;

pub use client::*;
pub use engine::*;
pub use error::*;
pub use event::*;
pub use peer::*;
pub use publisher::*;
pub use signaling::*;
