mod connection_event;
mod media_engine;
mod webrtc_engine;

pub use connection_event::*;
pub use media_engine::*;
pub use webrtc_engine::*;
